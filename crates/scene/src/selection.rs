use crate::engine::Scene;

/// Tracks the single highlighted object.
///
/// The previous object's highlight is always reset before the next one is
/// applied, so at most one object is highlighted at any time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Highlighter {
    current: Option<String>,
}

impl Highlighter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Highlights `object_id`; returns the previously highlighted id, if any.
    pub fn highlight(&mut self, scene: &dyn Scene, object_id: &str) -> Option<String> {
        if self.current.as_deref() == Some(object_id) {
            return None;
        }
        let previous = self.current.take();
        if let Some(prev) = &previous {
            scene.set_highlighted(prev, false);
        }
        scene.set_highlighted(object_id, true);
        self.current = Some(object_id.to_string());
        previous
    }

    pub fn clear(&mut self, scene: &dyn Scene) {
        if let Some(prev) = self.current.take() {
            scene.set_highlighted(&prev, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::Highlighter;
    use crate::sim::SimScene;

    #[test]
    fn previous_highlight_is_reset_first() {
        let scene = SimScene::new();
        let mut h = Highlighter::new();
        assert_eq!(h.highlight(&scene, "a"), None);
        assert_eq!(h.highlight(&scene, "b"), Some("a".to_string()));
        assert_eq!(
            scene.highlight_log(),
            vec![
                ("a".to_string(), true),
                ("a".to_string(), false),
                ("b".to_string(), true),
            ]
        );
        assert_eq!(scene.highlighted().into_iter().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn reselecting_same_object_is_a_no_op() {
        let scene = SimScene::new();
        let mut h = Highlighter::new();
        h.highlight(&scene, "a");
        assert_eq!(h.highlight(&scene, "a"), None);
        assert_eq!(scene.highlight_log().len(), 1);
        h.clear(&scene);
        assert_eq!(h.current(), None);
        assert!(scene.highlighted().is_empty());
    }
}
