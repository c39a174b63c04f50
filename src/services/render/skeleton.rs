// Skeleton drawing onto RGB canvases

use crate::models::pose::{FrameLandmarkSet, Landmark};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_polygon_mut};
use imageproc::point::Point;

pub const CONNECTION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const CONNECTION_THICKNESS: u32 = 4;
pub const LANDMARK_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
pub const LANDMARK_THICKNESS: u32 = 4;
pub const LANDMARK_RADIUS: u32 = 4;

/// Landmarks below this visibility are not drawn
pub const VISIBILITY_THRESHOLD: f32 = 0.5;

/// Pixel position of a landmark, `None` when it should not be drawn
fn to_pixel(landmark: &Landmark, width: u32, height: u32) -> Option<(f32, f32)> {
    if !landmark.is_visible(VISIBILITY_THRESHOLD) {
        return None;
    }
    if !(0.0..=1.0).contains(&landmark.x) || !(0.0..=1.0).contains(&landmark.y) {
        return None;
    }

    let max_x = width.saturating_sub(1) as f32;
    let max_y = height.saturating_sub(1) as f32;
    Some((landmark.x * max_x, landmark.y * max_y))
}

/// Draws a segment `thickness` pixels wide with round caps
fn draw_thick_line(
    canvas: &mut RgbImage,
    from: (f32, f32),
    to: (f32, f32),
    thickness: u32,
    color: Rgb<u8>,
) {
    let half = thickness as f32 / 2.0;
    let cap = (half.round() as i32).max(1);
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let length = (dx * dx + dy * dy).sqrt();

    if length >= 1.0 {
        let (nx, ny) = (-dy / length * half, dx / length * half);
        let corner = |x: f32, y: f32| Point::new(x.round() as i32, y.round() as i32);
        let poly = [
            corner(from.0 + nx, from.1 + ny),
            corner(to.0 + nx, to.1 + ny),
            corner(to.0 - nx, to.1 - ny),
            corner(from.0 - nx, from.1 - ny),
        ];
        // draw_polygon_mut rejects closed polygons
        if poly[0] != poly[3] {
            draw_polygon_mut(canvas, &poly, color);
        }
    }

    draw_filled_circle_mut(canvas, (from.0 as i32, from.1 as i32), cap, color);
    draw_filled_circle_mut(canvas, (to.0 as i32, to.1 as i32), cap, color);
}

/// Renders connections first, then joints on top
pub fn draw_landmarks(canvas: &mut RgbImage, set: &FrameLandmarkSet) {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let points: Vec<Option<(f32, f32)>> = set
        .landmarks()
        .iter()
        .map(|l| to_pixel(l, width, height))
        .collect();

    for (a, b) in set.connections() {
        if let (Some(from), Some(to)) = (points[a.index()], points[b.index()]) {
            draw_thick_line(canvas, from, to, CONNECTION_THICKNESS, CONNECTION_COLOR);
        }
    }

    // A joint is a filled disc of LANDMARK_RADIUS ringed by half the stroke
    let radius = (LANDMARK_RADIUS + LANDMARK_THICKNESS / 2) as i32;
    for (x, y) in points.into_iter().flatten() {
        draw_filled_circle_mut(canvas, (x as i32, y as i32), radius, LANDMARK_COLOR);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::pose::{LANDMARK_COUNT, PoseLandmark};

    /// A standing figure centered in the frame, every joint visible
    pub(crate) fn standing_pose() -> FrameLandmarkSet {
        let mut points = [Landmark::new(0.5, 0.5, 1.0); LANDMARK_COUNT];
        let mut set = |joint: PoseLandmark, x: f32, y: f32| {
            points[joint.index()] = Landmark::new(x, y, 0.99);
        };
        set(PoseLandmark::Nose, 0.5, 0.15);
        set(PoseLandmark::LeftShoulder, 0.4, 0.3);
        set(PoseLandmark::RightShoulder, 0.6, 0.3);
        set(PoseLandmark::LeftElbow, 0.35, 0.45);
        set(PoseLandmark::RightElbow, 0.65, 0.45);
        set(PoseLandmark::LeftWrist, 0.3, 0.6);
        set(PoseLandmark::RightWrist, 0.7, 0.6);
        set(PoseLandmark::LeftHip, 0.45, 0.6);
        set(PoseLandmark::RightHip, 0.55, 0.6);
        set(PoseLandmark::LeftKnee, 0.45, 0.75);
        set(PoseLandmark::RightKnee, 0.55, 0.75);
        set(PoseLandmark::LeftAnkle, 0.45, 0.9);
        set(PoseLandmark::RightAnkle, 0.55, 0.9);
        FrameLandmarkSet::new(points)
    }

    #[test]
    fn test_draws_joints_and_connections() {
        let mut canvas = RgbImage::new(100, 100);
        draw_landmarks(&mut canvas, &standing_pose());

        // Nose joint
        assert_eq!(*canvas.get_pixel(50, 15), LANDMARK_COLOR);
        // Midpoint of the shoulder line
        assert_eq!(*canvas.get_pixel(50, 30), CONNECTION_COLOR);
        // Far corner untouched
        assert_eq!(*canvas.get_pixel(2, 98), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_hidden_landmarks_are_skipped() {
        let points = [Landmark::new(0.5, 0.5, 0.1); LANDMARK_COUNT];
        let mut canvas = RgbImage::new(64, 64);
        draw_landmarks(&mut canvas, &FrameLandmarkSet::new(points));
        assert!(canvas.pixels().all(|p| *p == Rgb([0, 0, 0])));

        let points = [Landmark::new(1.5, -0.2, 1.0); LANDMARK_COUNT];
        draw_landmarks(&mut canvas, &FrameLandmarkSet::new(points));
        assert!(canvas.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_connection_to_hidden_joint_is_not_drawn() {
        let mut points = [Landmark::new(0.0, 0.0, 0.0); LANDMARK_COUNT];
        points[PoseLandmark::LeftShoulder.index()] = Landmark::new(0.2, 0.5, 1.0);
        points[PoseLandmark::RightShoulder.index()] = Landmark::new(0.8, 0.5, 0.2);
        let mut canvas = RgbImage::new(100, 100);

        draw_landmarks(&mut canvas, &FrameLandmarkSet::new(points));

        assert_eq!(*canvas.get_pixel(50, 50), Rgb([0, 0, 0]));
        assert_eq!(*canvas.get_pixel(20, 50), LANDMARK_COLOR);
    }

    #[test]
    fn test_tiny_canvas_does_not_panic() {
        let mut canvas = RgbImage::new(1, 1);
        draw_landmarks(&mut canvas, &standing_pose());
        let mut empty = RgbImage::new(0, 0);
        draw_landmarks(&mut empty, &standing_pose());
    }
}
