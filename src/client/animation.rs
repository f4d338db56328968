//! Per-avatar animation state machine.
//!
//! One active state plus at most one state fading out. One-shot states
//! (jump, punch) remember which looping state to return to when they end.

use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

use crate::lobby::AnimationTag;

/// Length of every cross-fade
pub const CROSS_FADE_SECONDS: f32 = 0.2;

/// Timing of one animation clip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clip {
    pub duration: f32,
    pub looping: bool,
}

impl Clip {
    pub const fn looping(duration: f32) -> Self {
        Self { duration, looping: true }
    }

    pub const fn once(duration: f32) -> Self {
        Self { duration, looping: false }
    }
}

/// Clip timings supplied by the asset layer
#[derive(Debug, Clone)]
pub struct ClipSet {
    clips: HashMap<AnimationTag, Clip>,
    fallback: Clip,
}

impl Default for ClipSet {
    fn default() -> Self {
        let mut clips = HashMap::new();
        clips.insert(AnimationTag::Idle, Clip::looping(2.0));
        clips.insert(AnimationTag::Walking, Clip::looping(1.0));
        clips.insert(AnimationTag::Jump, Clip::once(0.8));
        clips.insert(AnimationTag::Punch, Clip::once(0.6));
        Self {
            clips,
            fallback: Clip::looping(1.0),
        }
    }
}

impl ClipSet {
    pub fn with_clip(mut self, tag: impl Into<AnimationTag>, clip: Clip) -> Self {
        self.clips.insert(tag.into(), clip);
        self
    }

    /// Timing for `tag`; unknown custom clips loop
    pub fn get(&self, tag: &AnimationTag) -> Clip {
        self.clips.get(tag).copied().unwrap_or(self.fallback)
    }

    pub fn is_one_shot(&self, tag: &AnimationTag) -> bool {
        !self.get(tag).looping
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Layer {
    tag: AnimationTag,
    time: f32,
    weight: f32,
}

impl Layer {
    fn start(tag: AnimationTag, weight: f32) -> Self {
        Self { tag, time: 0.0, weight }
    }
}

/// One weighted clip sample
#[derive(Debug, Clone, PartialEq)]
pub struct PoseLayer {
    pub tag: AnimationTag,
    /// Playback position in seconds
    pub time: f32,
    pub weight: f32,
}

/// Blend handed to the scene each frame; weights sum to 1
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationPose {
    pub layers: SmallVec<[PoseLayer; 2]>,
}

impl AnimationPose {
    /// Layer with the largest weight
    pub fn dominant(&self) -> Option<&AnimationTag> {
        self.layers
            .iter()
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
            .map(|l| &l.tag)
    }
}

#[derive(Debug, Clone)]
pub struct AnimationStateMachine {
    clips: Arc<ClipSet>,
    current: Layer,
    outgoing: Option<Layer>,
    returns_to: Option<AnimationTag>,
}

impl AnimationStateMachine {
    /// Start fully in idle
    pub fn new(clips: Arc<ClipSet>) -> Self {
        Self {
            clips,
            current: Layer::start(AnimationTag::Idle, 1.0),
            outgoing: None,
            returns_to: None,
        }
    }

    pub fn current(&self) -> &AnimationTag {
        &self.current.tag
    }

    /// State a running one-shot will hand back to
    pub fn returns_to(&self) -> Option<&AnimationTag> {
        self.returns_to.as_ref()
    }

    pub fn is_fading(&self) -> bool {
        self.outgoing.is_some()
    }

    /// Explicit request; the latest one always wins
    pub fn transition(&mut self, tag: AnimationTag) {
        if tag == self.current.tag {
            return;
        }

        if self.clips.is_one_shot(&tag) {
            // Chained one-shots keep the earlier looping target
            if !self.clips.is_one_shot(&self.current.tag) {
                self.returns_to = Some(self.current.tag.clone());
            }
        } else {
            self.returns_to = None;
        }

        self.cross_fade(tag);
    }

    fn cross_fade(&mut self, tag: AnimationTag) {
        match self.outgoing.take() {
            // Reversal: pick the fading layer back up where it is
            Some(mut previous) if previous.tag == tag => {
                previous.weight = 1.0 - self.current.weight;
                let old = std::mem::replace(&mut self.current, previous);
                self.outgoing = Some(old);
            }
            _ => {
                let old = std::mem::replace(&mut self.current, Layer::start(tag, 0.0));
                self.outgoing = Some(old);
            }
        }
    }

    /// Advance by `dt` seconds. Returns the state a finished one-shot handed back to.
    pub fn advance(&mut self, dt: f32) -> Option<AnimationTag> {
        let dt = dt.max(0.0);

        if let Some(outgoing) = &mut self.outgoing {
            outgoing.time += dt;
        }
        self.current.weight = (self.current.weight + dt / CROSS_FADE_SECONDS).min(1.0);
        if self.current.weight >= 1.0 {
            self.outgoing = None;
        }

        self.current.time += dt;
        let clip = self.clips.get(&self.current.tag);
        if clip.looping {
            if clip.duration > 0.0 {
                self.current.time %= clip.duration;
            }
            return None;
        }

        if self.current.time >= clip.duration {
            self.current.time = clip.duration;
            let next = self.returns_to.take().unwrap_or(AnimationTag::Idle);
            self.cross_fade(next.clone());
            return Some(next);
        }
        None
    }

    pub fn pose(&self) -> AnimationPose {
        let mut layers = SmallVec::new();
        layers.push(PoseLayer {
            tag: self.current.tag.clone(),
            time: self.current.time,
            weight: self.current.weight,
        });
        if let Some(outgoing) = &self.outgoing {
            layers.push(PoseLayer {
                tag: outgoing.tag.clone(),
                time: outgoing.time,
                weight: 1.0 - self.current.weight,
            });
        }
        AnimationPose { layers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    fn machine() -> AnimationStateMachine {
        AnimationStateMachine::new(Arc::new(ClipSet::default()))
    }

    fn weight_of(pose: &AnimationPose, tag: &AnimationTag) -> f32 {
        pose.layers
            .iter()
            .filter(|l| &l.tag == tag)
            .map(|l| l.weight)
            .sum()
    }

    #[test]
    fn test_starts_idle() {
        let m = machine();
        assert_eq!(m.current(), &AnimationTag::Idle);
        assert_eq!(m.pose().layers.len(), 1);
        assert!(!m.is_fading());
    }

    #[test]
    fn test_cross_fade_takes_fixed_time() {
        let mut m = machine();
        m.transition(AnimationTag::Walking);

        m.advance(CROSS_FADE_SECONDS / 2.0);
        let pose = m.pose();
        assert!((weight_of(&pose, &AnimationTag::Walking) - 0.5).abs() < EPSILON);
        assert!((weight_of(&pose, &AnimationTag::Idle) - 0.5).abs() < EPSILON);

        m.advance(CROSS_FADE_SECONDS);
        assert!(!m.is_fading());
        assert_eq!(m.pose().layers.len(), 1);
    }

    #[test]
    fn test_one_shot_returns_to_previous_state() {
        let mut m = machine();
        m.transition(AnimationTag::Walking);
        m.advance(1.0);

        m.transition(AnimationTag::Jump);
        assert_eq!(m.returns_to(), Some(&AnimationTag::Walking));

        let mut finished = None;
        for _ in 0..10 {
            if let Some(next) = m.advance(0.1) {
                finished = Some(next);
                break;
            }
        }
        assert_eq!(finished, Some(AnimationTag::Walking));
        assert_eq!(m.current(), &AnimationTag::Walking);
        assert_eq!(m.returns_to(), None);
    }

    #[test]
    fn test_explicit_transition_cancels_return() {
        let mut m = machine();
        m.transition(AnimationTag::Jump);
        m.advance(0.1);

        m.transition(AnimationTag::Idle);

        assert_eq!(m.current(), &AnimationTag::Idle);
        assert_eq!(m.returns_to(), None);
        for _ in 0..20 {
            assert_eq!(m.advance(0.1), None);
        }
        assert_eq!(m.current(), &AnimationTag::Idle);
    }

    #[test]
    fn test_reversal_resumes_fading_weight() {
        let mut m = machine();
        m.transition(AnimationTag::Walking);
        m.advance(0.05); // walking 0.25, idle 0.75

        m.transition(AnimationTag::Idle);

        let pose = m.pose();
        assert!((weight_of(&pose, &AnimationTag::Idle) - 0.75).abs() < EPSILON);
        assert!((weight_of(&pose, &AnimationTag::Walking) - 0.25).abs() < EPSILON);
    }

    #[test]
    fn test_new_transition_drops_oldest_layer() {
        let mut m = machine();
        m.transition(AnimationTag::Walking);
        m.advance(0.05);
        m.transition(AnimationTag::Punch);

        let pose = m.pose();
        assert_eq!(pose.layers.len(), 2);
        assert_eq!(weight_of(&pose, &AnimationTag::Idle), 0.0);
        let total: f32 = pose.layers.iter().map(|l| l.weight).sum();
        assert!((total - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_chained_one_shots_end_in_loop() {
        let mut m = machine();
        m.transition(AnimationTag::Walking);
        m.advance(1.0);
        m.transition(AnimationTag::Jump);
        m.advance(0.1);
        m.transition(AnimationTag::Punch);

        assert_eq!(m.returns_to(), Some(&AnimationTag::Walking));

        let next = (0..20).find_map(|_| m.advance(0.1));
        assert_eq!(next, Some(AnimationTag::Walking));
    }

    #[test]
    fn test_same_state_is_noop() {
        let mut m = machine();
        m.transition(AnimationTag::Jump);
        m.advance(0.3);
        m.transition(AnimationTag::Jump);
        assert!((m.pose().layers[0].time - 0.3).abs() < EPSILON);
    }

    #[test]
    fn test_custom_clips() {
        let clips = ClipSet::default().with_clip("wave", Clip::once(0.5));
        let mut m = AnimationStateMachine::new(Arc::new(clips));

        m.transition(AnimationTag::from("wave"));
        assert_eq!(m.returns_to(), Some(&AnimationTag::Idle));

        let mut plain = machine();
        plain.transition(AnimationTag::from("dance"));
        assert_eq!(plain.returns_to(), None);
        assert_eq!((0..50).find_map(|_| plain.advance(0.1)), None);
    }

    #[test]
    fn test_looping_time_wraps() {
        let mut m = machine();
        m.advance(2.5);
        assert!((m.pose().layers[0].time - 0.5).abs() < EPSILON);
        assert_eq!(m.pose().dominant(), Some(&AnimationTag::Idle));
    }
}
