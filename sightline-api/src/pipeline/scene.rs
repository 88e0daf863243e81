//! Turning raw detections into street-crossing guidance
//!
//! Video: every frame's detections are placed (left/center/right and
//! very close/approaching/far), grouped by `label_horizontal_depth`, and
//! reduced to at most one spoken message. A group that was announced is
//! not repeated until [`ANNOUNCE_WINDOW_FRAMES`] frames later.
//!
//! Image: a flat, de-duplicated list of what was seen.

use std::collections::HashMap;

use super::classes::{ModelSource, ObjectClass};
use super::detector::{DetectionReport, RawDetection};

/// Minimum confidence for video guidance
pub const CONFIDENCE_THRESHOLD: f32 = 0.7;

/// Minimum confidence for image summaries
pub const IMAGE_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Frames before the same group may be announced again
pub const ANNOUNCE_WINDOW_FRAMES: u64 = 120;

pub const NO_OBJECTS: &str = "no objects detected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Horizontal {
    Left,
    Center,
    Right,
}

impl Horizontal {
    fn as_str(&self) -> &'static str {
        match self {
            Horizontal::Left => "left",
            Horizontal::Center => "center",
            Horizontal::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Depth {
    VeryClose,
    Approaching,
    Far,
}

impl Depth {
    fn as_str(&self) -> &'static str {
        match self {
            Depth::VeryClose => "very close",
            Depth::Approaching => "approaching",
            Depth::Far => "far",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Placed {
    class: ObjectClass,
    confidence: f32,
    horizontal: Horizontal,
    /// Bottom edge relative to frame height; nearer objects score higher
    dist_score: f32,
}

fn place(det: &RawDetection, width: f32, height: f32) -> Option<(Placed, Depth)> {
    let class = ObjectClass::from_model(det.source, det.class_id)?;
    let cx = det.bbox.center_x();
    let y2 = det.bbox.y2;

    let horizontal = if cx < width / 3.0 {
        Horizontal::Left
    } else if cx > 2.0 * width / 3.0 {
        Horizontal::Right
    } else {
        Horizontal::Center
    };

    let depth = if y2 > height * 0.75 {
        Depth::VeryClose
    } else if y2 > height * 0.5 {
        Depth::Approaching
    } else {
        Depth::Far
    };

    Some((
        Placed {
            class,
            confidence: det.confidence,
            horizontal,
            dist_score: y2 / height,
        },
        depth,
    ))
}

/// Detections sharing label, side and depth within one frame
#[derive(Debug)]
struct Group {
    key: String,
    /// First detection seen for this key
    lead: Placed,
    count: usize,
}

fn group_frame(detections: &[RawDetection], width: f32, height: f32) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    for det in detections {
        let Some((placed, depth)) = place(det, width, height) else {
            continue;
        };
        let key = format!(
            "{}_{}_{}",
            placed.class.label(),
            placed.horizontal.as_str(),
            depth.as_str()
        );
        match groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.count += 1,
            None => groups.push(Group {
                key,
                lead: placed,
                count: 1,
            }),
        }
    }
    groups
}

/// Stateful narrator for one video
#[derive(Debug, Default)]
pub struct SceneNarrator {
    last_announced: HashMap<String, u64>,
}

impl SceneNarrator {
    pub fn new() -> Self {
        Self::default()
    }

    fn should_announce(&mut self, key: &str, frame: u64) -> bool {
        match self.last_announced.get_mut(key) {
            None => {
                self.last_announced.insert(key.to_string(), frame);
                true
            }
            Some(last) => {
                if frame.saturating_sub(*last) >= ANNOUNCE_WINDOW_FRAMES {
                    *last = frame;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// The single most urgent message for a frame, if any
    pub fn frame_message(
        &mut self,
        frame: u64,
        detections: &[RawDetection],
        width: u32,
        height: u32,
    ) -> Option<String> {
        if detections.is_empty() || width == 0 || height == 0 {
            return None;
        }
        let groups = group_frame(detections, width as f32, height as f32);
        let mut candidates: Vec<(u8, String)> = Vec::new();

        for group in groups.iter().filter(|g| g.lead.class.is_traffic_light()) {
            if group.lead.confidence < CONFIDENCE_THRESHOLD {
                continue;
            }
            if !self.should_announce(&group.key, frame) {
                continue;
            }
            let candidate = match group.lead.class {
                ObjectClass::RedLight => (10, "Red light ahead. Stop and wait."),
                ObjectClass::GreenLight => (9, "Green light ahead. It's safe to cross."),
                _ => (9, "Yellow light ahead. Prepare to stop."),
            };
            candidates.push((candidate.0, candidate.1.to_string()));
        }

        // Only the first zebra group counts
        let zebra_key = groups
            .iter()
            .find(|g| g.lead.class == ObjectClass::ZebraCrossing)
            .filter(|g| g.lead.confidence >= CONFIDENCE_THRESHOLD)
            .map(|g| g.key.clone());

        let mut left: Vec<&Group> = Vec::new();
        let mut center: Vec<&Group> = Vec::new();
        let mut right: Vec<&Group> = Vec::new();
        let mut people: Vec<&Group> = Vec::new();

        for group in groups.iter() {
            if group.lead.confidence < CONFIDENCE_THRESHOLD {
                continue;
            }
            if group.lead.class.is_vehicle() {
                match group.lead.horizontal {
                    Horizontal::Left => left.push(group),
                    Horizontal::Center => center.push(group),
                    Horizontal::Right => right.push(group),
                }
            } else if group.lead.class == ObjectClass::Person {
                people.push(group);
            }
        }

        for side in [&mut center, &mut left, &mut right, &mut people] {
            side.sort_by(|a, b| b.lead.dist_score.total_cmp(&a.lead.dist_score));
        }

        for (side, vehicles) in [
            (Horizontal::Center, &center),
            (Horizontal::Left, &left),
            (Horizontal::Right, &right),
        ] {
            let Some(nearest) = vehicles.first() else {
                continue;
            };
            if !self.should_announce(&nearest.key, frame) {
                continue;
            }
            if let Some(candidate) = vehicle_warning(side, nearest) {
                candidates.push(candidate);
            }
        }

        if let Some(key) = zebra_key {
            if self.should_announce(&key, frame) {
                let any_vehicle = !(center.is_empty() && left.is_empty() && right.is_empty());
                if !any_vehicle {
                    candidates.push((
                        7,
                        "Zebra crossing in front of you. No vehicles nearby. You can cross now."
                            .to_string(),
                    ));
                } else if center
                    .iter()
                    .chain(left.iter())
                    .chain(right.iter())
                    .any(|v| v.lead.dist_score > 0.6)
                {
                    candidates.push((
                        8,
                        "Zebra crossing ahead, but vehicles are nearby. Wait for them to pass."
                            .to_string(),
                    ));
                }
            }
        }

        if let Some(person) = people.first() {
            if person.lead.dist_score > 0.75 && self.should_announce(&person.key, frame) {
                let who = if person.count > 1 {
                    format!("{} people", person.count)
                } else {
                    "Person".to_string()
                };
                let position = match person.lead.horizontal {
                    Horizontal::Center => "ahead",
                    Horizontal::Left => "left",
                    Horizontal::Right => "right",
                };
                candidates.push((4, format!("{} {}.", who, position)));
            }
        }

        // Highest priority wins; ties go to the earlier candidate
        let mut best: Option<(u8, String)> = None;
        for (priority, message) in candidates {
            if best.as_ref().map_or(true, |(p, _)| priority > *p) {
                best = Some((priority, message));
            }
        }
        best.map(|(_, message)| message)
    }
}

fn vehicle_warning(side: Horizontal, group: &Group) -> Option<(u8, String)> {
    let (count, name) = if group.count > 1 {
        (format!("{} ", group.count), group.lead.class.plural())
    } else {
        ("A ".to_string(), group.lead.class.label())
    };
    let dist = group.lead.dist_score;

    if dist > 0.75 {
        Some(match side {
            Horizontal::Center => (
                10,
                format!("Watch out! {}{} right in front of you! Stay where you are!", count, name),
            ),
            Horizontal::Left => (
                9,
                format!("Warning! {}{} on your left side! Don't move!", count, name),
            ),
            Horizontal::Right => (
                9,
                format!("Warning! {}{} on your right side! Don't move!", count, name),
            ),
        })
    } else if dist > 0.5 {
        Some(match side {
            Horizontal::Center => (8, format!("Careful! {}{} coming towards you.", count, name)),
            Horizontal::Left => (7, format!("{}{} approaching on your left.", count, name)),
            Horizontal::Right => (7, format!("{}{} approaching on your right.", count, name)),
        })
    } else {
        None
    }
}

/// Guidance log for a whole video, one entry per announcing frame
pub fn narrate_video(report: &DetectionReport) -> Vec<String> {
    let mut narrator = SceneNarrator::new();
    report
        .frames
        .iter()
        .enumerate()
        .filter_map(|(position, frame)| {
            // Detectors that omit frame indices get sequential numbering
            let index = frame.index.unwrap_or(position as u64);
            narrator.frame_message(index, &frame.detections, report.width, report.height)
        })
        .collect()
}

/// Flat summary of a still image
pub fn summarize_image(report: &DetectionReport) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut push = |line: String| {
        if !lines.contains(&line) {
            lines.push(line);
        }
    };

    for det in report.frames.iter().flat_map(|f| f.detections.iter()) {
        if det.confidence <= IMAGE_CONFIDENCE_THRESHOLD {
            continue;
        }
        match ObjectClass::from_model(det.source, det.class_id) {
            Some(class) => match det.source {
                ModelSource::General => push(format!("{} detected", class.label().to_lowercase())),
                ModelSource::TrafficLight => {
                    push(format!("traffic light {}", class.label().to_lowercase()))
                }
                ModelSource::Zebra => push("zebra crossing detected".to_string()),
            },
            // Classes outside the narration table are still named by the model's label
            None => match (det.source, det.label.as_deref().map(str::trim)) {
                (ModelSource::TrafficLight, Some(label)) if !label.is_empty() => {
                    push(format!("traffic light {}", label.to_lowercase()))
                }
                (_, Some(label)) if !label.is_empty() => {
                    push(format!("{} detected", label.to_lowercase()))
                }
                _ => {}
            },
        }
    }

    if lines.is_empty() {
        vec![NO_OBJECTS.to_string()]
    } else {
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::detector::{BoundingBox, FrameDetections};

    const W: u32 = 1200;
    const H: u32 = 800;

    fn det(source: ModelSource, class_id: u32, confidence: f32, cx: f32, y2: f32) -> RawDetection {
        RawDetection {
            source,
            class_id,
            confidence,
            bbox: BoundingBox {
                x1: cx - 50.0,
                y1: y2 - 100.0,
                x2: cx + 50.0,
                y2,
            },
            label: None,
        }
    }

    fn car(cx: f32, y2: f32) -> RawDetection {
        det(ModelSource::General, 2, 0.9, cx, y2)
    }

    fn red_light() -> RawDetection {
        det(ModelSource::TrafficLight, 3, 0.95, 600.0, 200.0)
    }

    fn zebra() -> RawDetection {
        det(ModelSource::Zebra, 8, 0.9, 600.0, 790.0)
    }

    #[test]
    fn test_red_light_beats_side_vehicle() {
        let mut narrator = SceneNarrator::new();
        let msg = narrator.frame_message(0, &[car(100.0, 700.0), red_light()], W, H);
        assert_eq!(msg.as_deref(), Some("Red light ahead. Stop and wait."));
    }

    #[test]
    fn test_close_center_vehicle() {
        let mut narrator = SceneNarrator::new();
        let msg = narrator.frame_message(0, &[car(600.0, 700.0)], W, H);
        assert_eq!(
            msg.as_deref(),
            Some("Watch out! A Car right in front of you! Stay where you are!")
        );
    }

    #[test]
    fn test_grouped_vehicles_are_counted() {
        let mut narrator = SceneNarrator::new();
        let msg = narrator.frame_message(0, &[car(1100.0, 500.0), car(1000.0, 480.0)], W, H);
        assert_eq!(msg.as_deref(), Some("2 Cars approaching on your right."));
    }

    #[test]
    fn test_far_vehicles_are_silent() {
        let mut narrator = SceneNarrator::new();
        assert!(narrator.frame_message(0, &[car(600.0, 300.0)], W, H).is_none());
    }

    #[test]
    fn test_low_confidence_ignored() {
        let mut narrator = SceneNarrator::new();
        let weak = det(ModelSource::TrafficLight, 3, 0.5, 600.0, 200.0);
        assert!(narrator.frame_message(0, &[weak], W, H).is_none());
    }

    #[test]
    fn test_announcement_throttled_for_window() {
        let mut narrator = SceneNarrator::new();
        assert!(narrator.frame_message(0, &[red_light()], W, H).is_some());
        assert!(narrator.frame_message(1, &[red_light()], W, H).is_none());
        assert!(narrator.frame_message(119, &[red_light()], W, H).is_none());
        assert!(narrator.frame_message(120, &[red_light()], W, H).is_some());
    }

    #[test]
    fn test_zebra_without_vehicles_says_cross() {
        let mut narrator = SceneNarrator::new();
        let msg = narrator.frame_message(0, &[zebra()], W, H);
        assert_eq!(
            msg.as_deref(),
            Some("Zebra crossing in front of you. No vehicles nearby. You can cross now.")
        );
    }

    #[test]
    fn test_zebra_with_near_vehicle_says_wait() {
        let mut narrator = SceneNarrator::new();
        // Side car at 0.65 of the frame: approaching (7) loses to zebra-wait (8)
        let msg = narrator.frame_message(0, &[zebra(), car(100.0, 520.0)], W, H);
        assert_eq!(
            msg.as_deref(),
            Some("Zebra crossing ahead, but vehicles are nearby. Wait for them to pass.")
        );
    }

    #[test]
    fn test_person_only_when_very_close() {
        let mut narrator = SceneNarrator::new();
        let near = det(ModelSource::General, 0, 0.9, 600.0, 780.0);
        let far = det(ModelSource::General, 0, 0.9, 600.0, 500.0);
        assert!(narrator.frame_message(0, &[far], W, H).is_none());
        assert_eq!(
            narrator.frame_message(1, &[near], W, H).as_deref(),
            Some("Person ahead.")
        );
    }

    #[test]
    fn test_narrate_video_logs_one_message_per_frame() {
        let report = DetectionReport {
            width: W,
            height: H,
            fps: 30.0,
            frames: vec![
                FrameDetections {
                    index: Some(0),
                    detections: vec![red_light(), car(600.0, 700.0)],
                },
                FrameDetections {
                    index: Some(1),
                    detections: vec![red_light()],
                },
                FrameDetections {
                    index: Some(2),
                    detections: vec![],
                },
            ],
            ..Default::default()
        };
        let log = narrate_video(&report);
        // Frame 0: red light (10) and center car (10) tie, the light came first
        assert_eq!(log, vec!["Red light ahead. Stop and wait.".to_string()]);
    }

    #[test]
    fn test_image_summary_dedups_in_order() {
        let report = DetectionReport {
            width: W,
            height: H,
            frames: vec![FrameDetections {
                index: Some(0),
                detections: vec![
                    car(100.0, 700.0),
                    det(ModelSource::General, 0, 0.8, 300.0, 700.0),
                    car(900.0, 700.0),
                    det(ModelSource::TrafficLight, 2, 0.7, 600.0, 100.0),
                    zebra(),
                    zebra(),
                    det(ModelSource::General, 5, 0.4, 600.0, 700.0),
                ],
            }],
            ..Default::default()
        };
        assert_eq!(
            summarize_image(&report),
            vec![
                "car detected",
                "person detected",
                "traffic light green light",
                "zebra crossing detected",
            ]
        );
    }

    #[test]
    fn test_image_summary_names_classes_outside_the_table() {
        let stop_sign = RawDetection {
            label: Some("stop sign".to_string()),
            ..det(ModelSource::General, 11, 0.9, 600.0, 400.0)
        };
        let unlabeled = det(ModelSource::General, 13, 0.9, 600.0, 400.0);
        let report = DetectionReport {
            width: W,
            height: H,
            frames: vec![FrameDetections {
                index: None,
                detections: vec![stop_sign, unlabeled, car(100.0, 700.0)],
            }],
            ..Default::default()
        };
        assert_eq!(
            summarize_image(&report),
            vec!["stop sign detected", "car detected"]
        );
    }

    #[test]
    fn test_explicit_frame_zero_is_not_renumbered() {
        // A red light at list position 0 and again at list position 130
        let frames = |last_index: Option<u64>| {
            let mut frames: Vec<FrameDetections> = (0..130)
                .map(|i| FrameDetections {
                    index: Some(i),
                    detections: if i == 0 { vec![red_light()] } else { vec![] },
                })
                .collect();
            frames.push(FrameDetections {
                index: last_index,
                detections: vec![red_light()],
            });
            frames
        };
        let report = |last_index| DetectionReport {
            width: W,
            height: H,
            frames: frames(last_index),
            ..Default::default()
        };

        // Frame 0 is still inside the window opened at frame 0
        assert_eq!(narrate_video(&report(Some(0))).len(), 1);
        // No index: numbered by position, 130 frames later
        assert_eq!(narrate_video(&report(None)).len(), 2);
    }

    #[test]
    fn test_empty_image_summary() {
        let report = DetectionReport {
            width: W,
            height: H,
            ..Default::default()
        };
        assert_eq!(summarize_image(&report), vec![NO_OBJECTS.to_string()]);
    }
}
