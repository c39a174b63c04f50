// Pose landmark data exchanged with the pose detector

use serde::{Deserialize, Serialize};

/// Number of landmarks in a full body pose
pub const LANDMARK_COUNT: usize = 33;

/// Body landmark indices (33 total)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PoseLandmark {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl PoseLandmark {
    pub fn index(self) -> usize {
        self as usize
    }
}

use PoseLandmark::*;

/// Fixed skeleton topology: joint pairs joined by a rendered line
pub const POSE_CONNECTIONS: [(PoseLandmark, PoseLandmark); 35] = [
    // Face
    (Nose, LeftEyeInner),
    (LeftEyeInner, LeftEye),
    (LeftEye, LeftEyeOuter),
    (LeftEyeOuter, LeftEar),
    (Nose, RightEyeInner),
    (RightEyeInner, RightEye),
    (RightEye, RightEyeOuter),
    (RightEyeOuter, RightEar),
    (MouthLeft, MouthRight),
    // Torso
    (LeftShoulder, RightShoulder),
    (LeftShoulder, LeftHip),
    (RightShoulder, RightHip),
    (LeftHip, RightHip),
    // Arms
    (LeftShoulder, LeftElbow),
    (LeftElbow, LeftWrist),
    (LeftWrist, LeftPinky),
    (LeftWrist, LeftIndex),
    (LeftWrist, LeftThumb),
    (LeftPinky, LeftIndex),
    (RightShoulder, RightElbow),
    (RightElbow, RightWrist),
    (RightWrist, RightPinky),
    (RightWrist, RightIndex),
    (RightWrist, RightThumb),
    (RightPinky, RightIndex),
    // Legs
    (LeftHip, LeftKnee),
    (LeftKnee, LeftAnkle),
    (LeftAnkle, LeftHeel),
    (LeftAnkle, LeftFootIndex),
    (LeftHeel, LeftFootIndex),
    (RightHip, RightKnee),
    (RightKnee, RightAnkle),
    (RightAnkle, RightHeel),
    (RightAnkle, RightFootIndex),
    (RightHeel, RightFootIndex),
];

/// One estimated keypoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32, // Normalized [0, 1] image coordinates
    pub y: f32,
    #[serde(default)]
    pub z: f32, // Depth relative to the hip midpoint
    #[serde(default = "default_visibility")]
    pub visibility: f32,
}

fn default_visibility() -> f32 {
    1.0
}

impl Landmark {
    pub fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self {
            x,
            y,
            z: 0.0,
            visibility,
        }
    }

    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility >= threshold
    }
}

/// Landmarks of one person in one frame. Always complete: a detector either
/// returns all 33 joints or no set at all.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameLandmarkSet {
    landmarks: [Landmark; LANDMARK_COUNT],
}

impl FrameLandmarkSet {
    pub fn new(landmarks: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { landmarks }
    }

    /// Builds a set from a detector response, `None` unless exactly 33 points
    pub fn from_vec(landmarks: Vec<Landmark>) -> Option<Self> {
        let landmarks: [Landmark; LANDMARK_COUNT] = landmarks.try_into().ok()?;
        Some(Self::new(landmarks))
    }

    pub fn get(&self, landmark: PoseLandmark) -> &Landmark {
        &self.landmarks[landmark.index()]
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn connections(&self) -> &'static [(PoseLandmark, PoseLandmark)] {
        &POSE_CONNECTIONS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_visibility() {
        let landmark = Landmark::new(0.5, 0.5, 0.8);
        assert!(landmark.is_visible(0.5));
        assert!(!landmark.is_visible(0.9));
    }

    #[test]
    fn test_set_requires_full_body() {
        let points = vec![Landmark::new(0.5, 0.5, 1.0); LANDMARK_COUNT];
        assert!(FrameLandmarkSet::from_vec(points).is_some());

        let partial = vec![Landmark::new(0.5, 0.5, 1.0); 17];
        assert!(FrameLandmarkSet::from_vec(partial).is_none());
    }

    #[test]
    fn test_connections_stay_in_range() {
        for (a, b) in POSE_CONNECTIONS {
            assert!(a.index() < LANDMARK_COUNT);
            assert!(b.index() < LANDMARK_COUNT);
            assert_ne!(a, b);
        }
    }

    #[test]
    fn test_landmark_defaults_when_deserialized() {
        let landmark: Landmark = serde_json::from_str(r#"{"x":0.1,"y":0.2}"#).unwrap();
        assert_eq!(landmark.z, 0.0);
        assert_eq!(landmark.visibility, 1.0);
    }
}
