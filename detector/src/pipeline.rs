use std::sync::Arc;
use std::time::Duration;

use frame_overlay_common::frame::{Detection, Frame, Rect, ScaleFactors, ScaledDetection};
use frame_overlay_common::progress::{percent, ProgressSink};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::classifier::traits::{Classifier, ClassifierError};

/// Rectangle of the first detection carrying `target_label`, in classifier
/// output order. Confidence is not consulted.
pub fn select_first(detections: &[Detection], target_label: &str) -> Option<Rect> {
    detections
        .iter()
        .find(|d| d.label == target_label)
        .map(|d| d.rect)
}

/// Runs every sampled frame through a [`Classifier`] and keeps one
/// display-space rectangle per frame.
pub struct DetectionPipeline {
    classifier: Arc<dyn Classifier>,
    target_label: String,
    timeout: Duration,
}

impl DetectionPipeline {
    pub fn new(classifier: Arc<dyn Classifier>, target_label: impl Into<String>, timeout: Duration) -> Self {
        Self {
            classifier,
            target_label: target_label.into(),
            timeout,
        }
    }

    pub fn classifier(&self) -> &Arc<dyn Classifier> {
        &self.classifier
    }

    /// Produce exactly one [`ScaledDetection`] per input frame, in the same
    /// order. Frames are consumed and released as soon as they have been
    /// classified. A frame whose classification fails, or that has no
    /// match, yields the zero rectangle.
    pub async fn detect(
        &self,
        frames: Vec<Frame>,
        scale: ScaleFactors,
        progress: &dyn ProgressSink,
    ) -> Vec<ScaledDetection> {
        let total = frames.len();
        let mut out = Vec::with_capacity(total);
        let mut matched = 0usize;

        for (position, frame) in frames.into_iter().enumerate() {
            let index = frame.index;
            let scaled = match self.classify(frame).await {
                Ok(detections) => match select_first(&detections, &self.target_label) {
                    Some(rect) => {
                        matched += 1;
                        let rect = rect.scaled(scale);
                        debug!(
                            index,
                            objects = detections.len(),
                            top = rect.top,
                            left = rect.left,
                            bottom = rect.bottom,
                            right = rect.right,
                            "target found"
                        );
                        ScaledDetection {
                            frame_index: index,
                            rect,
                        }
                    }
                    None => {
                        debug!(index, objects = detections.len(), "no target in frame");
                        ScaledDetection::empty(index)
                    }
                },
                Err(e) => {
                    warn!(error = %e, index, classifier = self.classifier.name(), "frame classification failed, using empty rect");
                    ScaledDetection::empty(index)
                }
            };
            out.push(scaled);

            progress.report(&format!(
                "Objects detected on {}% frames",
                percent(position + 1, total)
            ));
        }

        info!(
            frames = total,
            matched,
            target = self.target_label,
            "detection pass complete"
        );
        progress.report("Objects detected successfully!");
        out
    }

    async fn classify(&self, frame: Frame) -> Result<Vec<Detection>, ClassifierError> {
        let image = frame.image.ok_or(ClassifierError::MissingImage)?;
        let (width, height) = self.classifier.input_size();
        let input = fit_to_input(image, width, height);

        match tokio::time::timeout(self.timeout, self.classifier.recognize(&input)).await {
            Ok(result) => result,
            Err(_) => Err(ClassifierError::Timeout(self.timeout)),
        }
    }
}

/// Stretch to the model's input size with nearest-neighbour sampling. The
/// display scale factors undo the distortion later, so aspect is not kept.
fn fit_to_input(image: RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        return image;
    }
    imageops::resize(&image, width, height, FilterType::Nearest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers by frame: the top-left pixel's red channel carries the index.
    struct ScriptedClassifier {
        answers: HashMap<u8, Vec<Detection>>,
        failing: Vec<u8>,
        hanging: Vec<u8>,
        seen_sizes: Mutex<Vec<(u32, u32)>>,
    }

    impl ScriptedClassifier {
        fn new() -> Self {
            Self {
                answers: HashMap::new(),
                failing: Vec::new(),
                hanging: Vec::new(),
                seen_sizes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Classifier for ScriptedClassifier {
        fn input_size(&self) -> (u32, u32) {
            (300, 300)
        }

        async fn recognize(&self, image: &RgbImage) -> Result<Vec<Detection>, ClassifierError> {
            self.seen_sizes.lock().unwrap().push(image.dimensions());
            let key = image.get_pixel(0, 0).0[0];
            if self.hanging.contains(&key) {
                std::future::pending::<()>().await;
            }
            if self.failing.contains(&key) {
                return Err(ClassifierError::Failed("inference error".into()));
            }
            Ok(self.answers.get(&key).cloned().unwrap_or_default())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn det(label: &str, confidence: f32, rect: Rect) -> Detection {
        Detection {
            label: label.into(),
            confidence,
            rect,
        }
    }

    fn frame(index: usize) -> Frame {
        let image = RgbImage::from_pixel(640, 360, image::Rgb([index as u8, 0, 0]));
        Frame::new(index, index as i64 * 1000, image)
    }

    fn frames(n: usize) -> Vec<Frame> {
        (0..n).map(frame).collect()
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ProgressSink for Recorder {
        fn report(&self, status: &str) {
            self.0.lock().unwrap().push(status.to_string());
        }
    }

    fn pipeline(classifier: ScriptedClassifier) -> DetectionPipeline {
        DetectionPipeline::new(Arc::new(classifier), "person", Duration::from_secs(1))
    }

    #[test]
    fn first_match_wins_over_confidence() {
        let detections = vec![
            det("dog", 0.99, Rect::new(0.0, 0.0, 5.0, 5.0)),
            det("person", 0.30, Rect::new(1.0, 1.0, 2.0, 2.0)),
            det("person", 0.95, Rect::new(3.0, 3.0, 4.0, 4.0)),
        ];
        assert_eq!(
            select_first(&detections, "person"),
            Some(Rect::new(1.0, 1.0, 2.0, 2.0))
        );
        assert_eq!(select_first(&detections, "cat"), None);
    }

    #[tokio::test]
    async fn ten_frames_three_matches() {
        let mut classifier = ScriptedClassifier::new();
        let person = Rect::new(30.0, 60.0, 150.0, 120.0);
        for i in [2u8, 5, 9] {
            classifier
                .answers
                .insert(i, vec![det("chair", 0.8, Rect::zero()), det("person", 0.7, person)]);
        }
        classifier
            .answers
            .insert(4, vec![det("dog", 0.9, Rect::new(1.0, 1.0, 9.0, 9.0))]);

        let progress = Recorder::default();
        let scale = ScaleFactors::new(4.0, 2.0);
        let out = pipeline(classifier).detect(frames(10), scale, &progress).await;

        assert_eq!(out.len(), 10);
        for (i, d) in out.iter().enumerate() {
            assert_eq!(d.frame_index, i);
            if [2, 5, 9].contains(&i) {
                assert_eq!(d.rect, Rect::new(60.0, 240.0, 300.0, 480.0));
            } else {
                assert_eq!(d.rect, Rect::zero());
            }
        }

        let lines = progress.0.lock().unwrap();
        assert_eq!(lines.len(), 11);
        assert_eq!(lines[0], "Objects detected on 10% frames");
        assert_eq!(lines[9], "Objects detected on 100% frames");
        assert_eq!(lines[10], "Objects detected successfully!");
    }

    #[tokio::test]
    async fn frames_are_resized_to_input() {
        let classifier = Arc::new(ScriptedClassifier::new());
        let pipeline = DetectionPipeline::new(classifier.clone(), "person", Duration::from_secs(1));
        pipeline
            .detect(frames(2), ScaleFactors::default(), &Recorder::default())
            .await;
        assert_eq!(
            classifier.seen_sizes.lock().unwrap().as_slice(),
            [(300, 300), (300, 300)]
        );
    }

    #[tokio::test]
    async fn failures_do_not_abort_batch() {
        let mut classifier = ScriptedClassifier::new();
        classifier.failing.push(1);
        classifier
            .answers
            .insert(2, vec![det("person", 0.5, Rect::new(1.0, 1.0, 2.0, 2.0))]);

        let mut input = frames(3);
        input.push(Frame::missing(3, 3000));

        let out = pipeline(classifier)
            .detect(input, ScaleFactors::default(), &Recorder::default())
            .await;
        assert_eq!(out.len(), 4);
        assert_eq!(out[1], ScaledDetection::empty(1));
        assert_eq!(out[2].rect, Rect::new(1.0, 1.0, 2.0, 2.0));
        assert_eq!(out[3], ScaledDetection::empty(3));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_classifier_times_out_per_frame() {
        let mut classifier = ScriptedClassifier::new();
        classifier.hanging.push(0);
        classifier
            .answers
            .insert(1, vec![det("person", 0.5, Rect::new(1.0, 1.0, 2.0, 2.0))]);

        let out = pipeline(classifier)
            .detect(frames(2), ScaleFactors::default(), &Recorder::default())
            .await;
        assert_eq!(out[0], ScaledDetection::empty(0));
        assert!(out[1].is_match());
    }

    #[tokio::test]
    async fn empty_input_reports_completion() {
        let progress = Recorder::default();
        let out = pipeline(ScriptedClassifier::new())
            .detect(Vec::new(), ScaleFactors::default(), &progress)
            .await;
        assert!(out.is_empty());
        assert_eq!(
            progress.0.lock().unwrap().as_slice(),
            ["Objects detected successfully!"]
        );
    }
}
