use crate::capture::domain::frame_source::FrameSource;
use crate::dataset::domain::face_image_store::FaceImageStore;
use crate::detection::domain::face_locator::FaceLocator;
use crate::shared::face_image::FaceImage;
use crate::shared::label::IdentityLabel;

use super::face_normalizer::FaceNormalizer;

/// What happened on one capture tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// A face was stored under this key.
    Captured(String),
    NoFrame,
    NoFace,
    /// The first region had no visible area inside the frame.
    Uncroppable,
    LocatorFailed,
    SaveFailed,
}

/// The collaborators a tick reads from and writes to.
pub struct CaptureContext<'a> {
    pub frames: &'a mut dyn FrameSource,
    pub locator: &'a mut dyn FaceLocator,
    pub normalizer: &'a FaceNormalizer,
    pub store: &'a dyn FaceImageStore,
}

/// One timed burst of face captures for a single label.
///
/// Every tick advances the counter whether or not a face was captured; the
/// session is complete after `tick_limit` ticks.
#[derive(Debug)]
pub struct CaptureSession {
    label: IdentityLabel,
    ticks_elapsed: u32,
    tick_limit: u32,
    images: Vec<FaceImage>,
    saved_keys: Vec<String>,
}

impl CaptureSession {
    pub fn new(label: IdentityLabel, tick_limit: u32) -> Self {
        Self {
            label,
            ticks_elapsed: 0,
            tick_limit,
            images: Vec::new(),
            saved_keys: Vec::new(),
        }
    }

    pub fn label(&self) -> IdentityLabel {
        self.label
    }

    pub fn ticks_elapsed(&self) -> u32 {
        self.ticks_elapsed
    }

    pub fn captured_count(&self) -> usize {
        self.images.len()
    }

    pub fn is_complete(&self) -> bool {
        self.ticks_elapsed >= self.tick_limit
    }

    /// Runs one capture attempt. Failures only cost this tick.
    pub fn tick(&mut self, ctx: &mut CaptureContext<'_>) -> TickOutcome {
        self.ticks_elapsed = self.ticks_elapsed.saturating_add(1);
        let outcome = self.capture(ctx);
        log::debug!(
            "Tick {}/{} for label {}: {outcome:?}",
            self.ticks_elapsed,
            self.tick_limit,
            self.label
        );
        outcome
    }

    fn capture(&mut self, ctx: &mut CaptureContext<'_>) -> TickOutcome {
        let frame = match ctx.frames.latest_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return TickOutcome::NoFrame,
            Err(e) => {
                log::warn!("Frame source failed: {e}");
                return TickOutcome::NoFrame;
            }
        };

        let gray = frame.grayscale();
        let regions = match ctx.locator.locate(&gray) {
            Ok(regions) => regions,
            Err(e) => {
                log::warn!("Face locator failed on frame {}: {e}", frame.index());
                return TickOutcome::LocatorFailed;
            }
        };
        let Some(region) = regions.first() else {
            return TickOutcome::NoFace;
        };
        let Some(face) = ctx.normalizer.normalize(&gray, region) else {
            return TickOutcome::Uncroppable;
        };

        match ctx.store.save(self.label, &face) {
            Ok(key) => {
                self.images.push(face);
                self.saved_keys.push(key.clone());
                TickOutcome::Captured(key)
            }
            Err(e) => {
                log::warn!("Dropping capture for label {}: {e}", self.label);
                TickOutcome::SaveFailed
            }
        }
    }

    /// Removes every image this session stored. Best effort: failures are
    /// logged and the remaining images are still removed.
    pub fn discard(self, store: &dyn FaceImageStore) {
        for key in &self.saved_keys {
            if let Err(e) = store.remove(key) {
                log::warn!("Failed to remove {key} after cancel: {e}");
            }
        }
        log::info!(
            "Discarded capture session for label {} ({} image(s) removed)",
            self.label,
            self.saved_keys.len()
        );
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use image::GrayImage;

    use crate::capture::domain::frame_source::FrameSource;
    use crate::dataset::domain::face_image_store::FaceImageStore;
    use crate::detection::domain::face_locator::FaceLocator;
    use crate::shared::error::FaceIdError;
    use crate::shared::face_image::FaceImage;
    use crate::shared::frame::Frame;
    use crate::shared::label::IdentityLabel;
    use crate::shared::region::Region;

    pub fn gray_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(vec![value; (width * height) as usize], width, height, 1, 0)
    }

    /// Always returns the same frame, or none.
    pub struct StubFrames(pub Option<Frame>);

    impl FrameSource for StubFrames {
        fn latest_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
            Ok(self.0.clone())
        }
    }

    /// Replays scripted results, then keeps returning the last one.
    pub struct ScriptedLocator {
        script: VecDeque<Result<Vec<Region>, String>>,
        last: Result<Vec<Region>, String>,
    }

    impl ScriptedLocator {
        pub fn always(regions: Vec<Region>) -> Self {
            Self {
                script: VecDeque::new(),
                last: Ok(regions),
            }
        }

        pub fn sequence(script: Vec<Result<Vec<Region>, String>>) -> Self {
            Self {
                script: script.into(),
                last: Ok(Vec::new()),
            }
        }
    }

    impl FaceLocator for ScriptedLocator {
        fn locate(&mut self, _gray: &GrayImage) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            let next = self.script.pop_front().unwrap_or_else(|| self.last.clone());
            next.map_err(|e| e.into())
        }
    }

    /// In-memory store that can be told to fail the next saves.
    #[derive(Default)]
    pub struct MemoryStore {
        pub entries: Mutex<Vec<(String, FaceImage)>>,
        pub failing_saves: Mutex<u32>,
    }

    impl FaceImageStore for MemoryStore {
        fn save(&self, label: IdentityLabel, face: &FaceImage) -> Result<String, FaceIdError> {
            let mut failing = self.failing_saves.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(FaceIdError::persistence("memory", "disk full"));
            }
            let mut entries = self.entries.lock().unwrap();
            let key = format!("{label}.{}.png", entries.len() + 1);
            entries.push((key.clone(), face.clone()));
            Ok(key)
        }

        fn keys(&self) -> Result<Vec<String>, FaceIdError> {
            Ok(self.entries.lock().unwrap().iter().map(|(k, _)| k.clone()).collect())
        }

        fn load(&self, key: &str) -> Result<FaceImage, FaceIdError> {
            self.entries
                .lock()
                .unwrap()
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, f)| f.clone())
                .ok_or_else(|| FaceIdError::corrupt_entry(key, "missing"))
        }

        fn remove(&self, key: &str) -> Result<(), FaceIdError> {
            self.entries.lock().unwrap().retain(|(k, _)| k != key);
            Ok(())
        }

        fn locate(&self, key: &str) -> PathBuf {
            PathBuf::from(key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::shared::region::Region;

    fn face_region() -> Region {
        Region::new(10, 10, 20, 20)
    }

    fn run_ticks(
        session: &mut CaptureSession,
        frames: &mut StubFrames,
        locator: &mut ScriptedLocator,
        store: &MemoryStore,
        n: u32,
    ) -> Vec<TickOutcome> {
        let normalizer = FaceNormalizer::new(8, 10);
        let mut ctx = CaptureContext {
            frames,
            locator,
            normalizer: &normalizer,
            store,
        };
        (0..n).map(|_| session.tick(&mut ctx)).collect()
    }

    #[test]
    fn test_face_every_tick_captures_every_tick() {
        let mut session = CaptureSession::new(IdentityLabel::new(1), 4);
        let mut frames = StubFrames(Some(gray_frame(64, 48, 90)));
        let mut locator = ScriptedLocator::always(vec![face_region()]);
        let store = MemoryStore::default();

        let outcomes = run_ticks(&mut session, &mut frames, &mut locator, &store, 4);

        assert!(outcomes.iter().all(|o| matches!(o, TickOutcome::Captured(_))));
        assert!(session.is_complete());
        assert_eq!(session.captured_count(), 4);
        assert_eq!(session.saved_keys.len(), 4);
        assert!(session.images.iter().all(|f| f.dimensions() == (8, 10)));
    }

    #[test]
    fn test_misses_still_advance_ticks() {
        let mut session = CaptureSession::new(IdentityLabel::new(2), 4);
        let mut frames = StubFrames(Some(gray_frame(64, 48, 90)));
        let mut locator = ScriptedLocator::sequence(vec![
            Ok(vec![]),
            Err("model crashed".into()),
            Ok(vec![Region::new(500, 500, 5, 5)]),
            Ok(vec![face_region(), Region::new(0, 0, 4, 4)]),
        ]);
        let store = MemoryStore::default();

        let outcomes = run_ticks(&mut session, &mut frames, &mut locator, &store, 4);

        assert_eq!(outcomes[0], TickOutcome::NoFace);
        assert_eq!(outcomes[1], TickOutcome::LocatorFailed);
        assert_eq!(outcomes[2], TickOutcome::Uncroppable);
        assert!(matches!(outcomes[3], TickOutcome::Captured(_)));
        assert_eq!(session.ticks_elapsed(), 4);
        assert_eq!(session.captured_count(), 1);
    }

    #[test]
    fn test_missing_frame_counts_as_tick() {
        let mut session = CaptureSession::new(IdentityLabel::new(3), 2);
        let mut frames = StubFrames(None);
        let mut locator = ScriptedLocator::always(vec![face_region()]);
        let store = MemoryStore::default();

        let outcomes = run_ticks(&mut session, &mut frames, &mut locator, &store, 2);

        assert_eq!(outcomes, vec![TickOutcome::NoFrame, TickOutcome::NoFrame]);
        assert!(session.is_complete());
        assert_eq!(session.captured_count(), 0);
    }

    #[test]
    fn test_save_failure_drops_only_that_tick() {
        let mut session = CaptureSession::new(IdentityLabel::new(4), 3);
        let mut frames = StubFrames(Some(gray_frame(64, 48, 90)));
        let mut locator = ScriptedLocator::always(vec![face_region()]);
        let store = MemoryStore::default();
        *store.failing_saves.lock().unwrap() = 1;

        let outcomes = run_ticks(&mut session, &mut frames, &mut locator, &store, 3);

        assert_eq!(outcomes[0], TickOutcome::SaveFailed);
        assert_eq!(session.captured_count(), 2);
        assert_eq!(store.keys().unwrap().len(), 2);
    }

    #[test]
    fn test_discard_removes_session_images_only() {
        let store = MemoryStore::default();
        let earlier = FaceImage::from_raw(8, 10, vec![0; 80]).unwrap();
        store.save(IdentityLabel::new(9), &earlier).unwrap();

        let mut session = CaptureSession::new(IdentityLabel::new(5), 2);
        let mut frames = StubFrames(Some(gray_frame(64, 48, 90)));
        let mut locator = ScriptedLocator::always(vec![face_region()]);
        run_ticks(&mut session, &mut frames, &mut locator, &store, 2);
        assert_eq!(store.keys().unwrap().len(), 3);

        session.discard(&store);

        assert_eq!(store.keys().unwrap(), vec!["9.1.png".to_string()]);
    }
}
