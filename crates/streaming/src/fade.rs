use std::time::Duration;

use scene::{GroupHandle, Scene};

/// Linear opacity ramp from 0 to `target` in `steps` equal increments.
///
/// Each step sets the group's opacity once and issues a single render
/// request for the whole scene.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FadeIn {
    pub duration: Duration,
    pub steps: u32,
    pub target: f32,
}

impl FadeIn {
    pub fn new(duration: Duration, steps: u32, target: f32) -> Self {
        Self {
            duration,
            steps: steps.max(1),
            target: target.clamp(0.0, 1.0),
        }
    }

    pub fn opacity_at(&self, step: u32) -> f32 {
        self.target * (step.min(self.steps) as f32 / self.steps as f32)
    }

    pub async fn run(&self, group: &GroupHandle, scene: &dyn Scene) {
        let interval = self.duration / self.steps;
        for step in 1..=self.steps {
            tokio::time::sleep(interval).await;
            group.set_opacity(self.opacity_at(step));
            scene.request_render();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use scene::sim::SimScene;
    use scene::{FeatureCollection, Scene};
    use tokio::time::Instant;

    use super::FadeIn;

    #[tokio::test(start_paused = true)]
    async fn ramps_linearly_with_one_render_per_step() {
        let scene = SimScene::new();
        let group = scene.attach_group("tile:0_0", &FeatureCollection::default(), 0.0);
        let fade = FadeIn::new(Duration::from_millis(300), 10, 1.0);

        let started = Instant::now();
        fade.run(&group, &scene).await;
        assert_eq!(started.elapsed(), Duration::from_millis(300));

        let history = scene.group("tile:0_0").unwrap().opacity_history();
        assert_eq!(history.len(), 11);
        assert_eq!(history[0], 0.0);
        assert!((history[5] - 0.5).abs() < 1e-6);
        assert_eq!(history[10], 1.0);
        assert!(history.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(scene.render_requests(), 10);
    }

    #[test]
    fn zero_steps_is_a_single_step() {
        let fade = FadeIn::new(Duration::from_millis(100), 0, 0.8);
        assert_eq!(fade.steps, 1);
        assert_eq!(fade.opacity_at(1), 0.8);
    }
}
