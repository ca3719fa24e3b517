/// Geographic position in degrees (WGS84 longitude/latitude).
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Squared planar distance in degrees².
    ///
    /// Only meaningful for ordering nearby points; no square root is taken.
    pub fn distance_sq(self, other: Self) -> f64 {
        let dlon = self.lon - other.lon;
        let dlat = self.lat - other.lat;
        dlon * dlon + dlat * dlat
    }
}

/// Geographic rectangle in degrees.
///
/// Rectangles never wrap the antimeridian: `west <= east` and `south <= north`
/// are expected for every value produced by this crate.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GeoRect {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoRect {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Smallest rectangle containing every point, or `None` for an empty input.
    pub fn from_points(points: impl IntoIterator<Item = GeoPoint>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut rect = Self::new(first.lon, first.lat, first.lon, first.lat);
        for p in iter {
            rect.west = rect.west.min(p.lon);
            rect.east = rect.east.max(p.lon);
            rect.south = rect.south.min(p.lat);
            rect.north = rect.north.max(p.lat);
        }
        Some(rect)
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.west + self.east) * 0.5,
            (self.south + self.north) * 0.5,
        )
    }

    /// Grows the rectangle by `fraction` of its width/height on each side.
    ///
    /// Negative fractions are clamped to zero so the result always contains `self`.
    pub fn expand(&self, fraction: f64) -> Self {
        let f = fraction.max(0.0);
        let dx = self.width() * f;
        let dy = self.height() * f;
        Self {
            west: self.west - dx,
            south: (self.south - dy).max(-90.0),
            east: self.east + dx,
            north: (self.north + dy).min(90.0),
        }
    }

    pub fn contains(&self, p: GeoPoint) -> bool {
        p.lon >= self.west && p.lon <= self.east && p.lat >= self.south && p.lat <= self.north
    }

    pub fn contains_rect(&self, other: &Self) -> bool {
        other.west >= self.west
            && other.east <= self.east
            && other.south >= self.south
            && other.north <= self.north
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.west <= other.east
            && other.west <= self.east
            && self.south <= other.north
            && other.south <= self.north
    }
}

#[cfg(test)]
mod tests {
    use super::{GeoPoint, GeoRect};

    #[test]
    fn expand_is_superset() {
        let r = GeoRect::new(24.90, 60.15, 25.00, 60.20);
        let b = r.expand(0.2);
        assert!(b.contains_rect(&r));
        assert!((b.west - 24.88).abs() < 1e-9);
        assert!((b.north - 60.21).abs() < 1e-9);
    }

    #[test]
    fn negative_expansion_is_clamped() {
        let r = GeoRect::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(r.expand(-0.5), r);
    }

    #[test]
    fn from_points_bounds_all() {
        let r = GeoRect::from_points([
            GeoPoint::new(1.0, 5.0),
            GeoPoint::new(-2.0, 3.0),
            GeoPoint::new(0.5, 7.0),
        ])
        .unwrap();
        assert_eq!(r, GeoRect::new(-2.0, 3.0, 1.0, 7.0));
        assert!(GeoRect::from_points([]).is_none());
    }

    #[test]
    fn intersection_and_center() {
        let a = GeoRect::new(0.0, 0.0, 2.0, 2.0);
        let b = GeoRect::new(1.0, 1.0, 3.0, 3.0);
        let c = GeoRect::new(5.0, 5.0, 6.0, 6.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_eq!(a.center(), GeoPoint::new(1.0, 1.0));
        assert_eq!(GeoPoint::new(0.0, 0.0).distance_sq(GeoPoint::new(3.0, 4.0)), 25.0);
    }
}
