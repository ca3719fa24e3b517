use foundation::GeoPoint;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// One entity record as delivered by the data layer (GeoJSON-shaped).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
}

impl Feature {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// A feature with GeoJSON `Point` geometry.
    pub fn point(id: impl Into<String>, at: GeoPoint) -> Self {
        Self {
            geometry: Some(json!({ "type": "Point", "coordinates": [at.lon, at.lat] })),
            ..Self::new(id)
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn property_f64(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(Value::as_f64)
    }

    /// Representative position: the point itself, or the first vertex of a
    /// line/polygon ring.
    pub fn anchor(&self) -> Option<GeoPoint> {
        let geometry = self.geometry.as_ref()?;
        let mut coords = geometry.get("coordinates")?;
        // Descend nested arrays until we reach a [lon, lat, ..] pair.
        while let Some(first) = coords.as_array()?.first() {
            if first.is_number() {
                break;
            }
            coords = first;
        }
        let pair = coords.as_array()?;
        Some(GeoPoint::new(pair.first()?.as_f64()?, pair.get(1)?.as_f64()?))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use foundation::GeoPoint;
    use pretty_assertions::assert_eq;

    use super::{Feature, FeatureCollection};

    #[test]
    fn point_anchor_round_trips() {
        let f = Feature::point("b1", GeoPoint::new(24.94, 60.17)).with_property("floors", 4);
        assert_eq!(f.anchor(), Some(GeoPoint::new(24.94, 60.17)));
        assert_eq!(f.property_f64("floors"), Some(4.0));
    }

    #[test]
    fn polygon_anchor_is_first_vertex() {
        let text = r#"{"features":[{"id":"p","properties":{"postinumero":"00100"},
            "geometry":{"type":"Polygon","coordinates":[[[24.9,60.1],[25.0,60.1],[25.0,60.2]]]}}]}"#;
        let fc = FeatureCollection::from_json(text).unwrap();
        assert_eq!(fc.len(), 1);
        assert_eq!(fc.features[0].anchor(), Some(GeoPoint::new(24.9, 60.1)));
        assert_eq!(fc.features[0].property_str("postinumero"), Some("00100"));
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(FeatureCollection::from_json(r#"{"features": 3}"#).is_err());
    }
}
