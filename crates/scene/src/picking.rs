use foundation::GeoPoint;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result of a pointer pick as reported by the engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PickedObject {
    pub id: String,
    pub properties: Map<String, Value>,
    /// Ground position under the pointer, when the engine can resolve it.
    pub position: Option<GeoPoint>,
}

impl PickedObject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn at(mut self, position: GeoPoint) -> Self {
        self.position = Some(position);
        self
    }
}

/// Property names that carry navigation identity on picked objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickKeys {
    pub area_key: String,
    pub area_name_key: String,
    pub object_key: String,
    pub centroid_lon_key: String,
    pub centroid_lat_key: String,
}

impl Default for PickKeys {
    fn default() -> Self {
        Self {
            area_key: "postinumero".to_string(),
            area_name_key: "nimi".to_string(),
            object_key: "building_id".to_string(),
            centroid_lon_key: "center_lon".to_string(),
            centroid_lat_key: "center_lat".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AreaPick {
    pub area_id: String,
    pub name: Option<String>,
    pub centroid: GeoPoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPick {
    pub object_id: String,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PickTarget {
    Area(AreaPick),
    Object(ObjectPick),
    Unrecognized,
}

/// Decides what a picked object navigates to.
///
/// The area attribute wins over the object attribute. An area with neither
/// explicit centroid properties nor a ground position cannot be flown to and
/// is reported as unrecognized.
pub fn classify(picked: &PickedObject, keys: &PickKeys) -> PickTarget {
    if let Some(area_id) = identity(picked.properties.get(&keys.area_key)) {
        let explicit = picked
            .properties
            .get(&keys.centroid_lon_key)
            .and_then(Value::as_f64)
            .zip(
                picked
                    .properties
                    .get(&keys.centroid_lat_key)
                    .and_then(Value::as_f64),
            )
            .map(|(lon, lat)| GeoPoint::new(lon, lat));
        let Some(centroid) = explicit.or(picked.position) else {
            return PickTarget::Unrecognized;
        };
        return PickTarget::Area(AreaPick {
            area_id,
            name: picked
                .properties
                .get(&keys.area_name_key)
                .and_then(Value::as_str)
                .map(str::to_string),
            centroid,
        });
    }

    if let Some(object_id) = identity(picked.properties.get(&keys.object_key)) {
        return PickTarget::Object(ObjectPick {
            object_id,
            properties: picked.properties.clone(),
        });
    }

    PickTarget::Unrecognized
}

fn identity(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use foundation::GeoPoint;
    use pretty_assertions::assert_eq;

    use super::{AreaPick, PickKeys, PickTarget, PickedObject, classify};

    #[test]
    fn area_attribute_selects_area() {
        let picked = PickedObject::new("pc-00100")
            .with_property("postinumero", "00100")
            .with_property("nimi", "Helsinki keskusta")
            .with_property("center_lon", 24.94)
            .with_property("center_lat", 60.17)
            .with_property("building_id", "ignored");
        assert_eq!(
            classify(&picked, &PickKeys::default()),
            PickTarget::Area(AreaPick {
                area_id: "00100".to_string(),
                name: Some("Helsinki keskusta".to_string()),
                centroid: GeoPoint::new(24.94, 60.17),
            })
        );
    }

    #[test]
    fn area_falls_back_to_pick_position() {
        let picked = PickedObject::new("x")
            .with_property("postinumero", 100)
            .at(GeoPoint::new(1.0, 2.0));
        let PickTarget::Area(area) = classify(&picked, &PickKeys::default()) else {
            panic!("expected area");
        };
        assert_eq!(area.area_id, "100");
        assert_eq!(area.centroid, GeoPoint::new(1.0, 2.0));
    }

    #[test]
    fn building_without_area_selects_object() {
        let picked = PickedObject::new("b").with_property("building_id", "B-42");
        match classify(&picked, &PickKeys::default()) {
            PickTarget::Object(o) => assert_eq!(o.object_id, "B-42"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn anonymous_objects_are_unrecognized() {
        let keys = PickKeys::default();
        assert_eq!(classify(&PickedObject::new("tree"), &keys), PickTarget::Unrecognized);
        let no_centroid = PickedObject::new("pc").with_property("postinumero", "00100");
        assert_eq!(classify(&no_centroid, &keys), PickTarget::Unrecognized);
    }
}
