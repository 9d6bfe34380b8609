//! Camera and camera controllers.
//!
//! The camera is described the way a look-at camera usually is: a position, the
//! point it looks at, an up vector and a vertical field of view. Controllers
//! mutate it once per frame; render passes only read it.

use cgmath::{Deg, InnerSpace, Matrix4, Point3, Rad, Transform, Vector3, Vector4};
use instant::Duration;
use winit::{
    event::{ElementState, KeyEvent, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

use crate::config::CameraConfig;

/// Converts cgmath's OpenGL clip space (z in -1..1) to wgpu's (z in 0..1).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Near and far clip distances of the main camera.
pub const CULL_NEAR: f32 = 0.01;
pub const CULL_FAR: f32 = 1000.0;

const SAFE_FRAC_PI_2: f32 = std::f32::consts::FRAC_PI_2 - 0.0001;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectionKind {
    Perspective,
    /// `fovy` is the height of the view volume in world units.
    Orthographic,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    /// Vertical field of view in degrees.
    pub fovy: f32,
    pub projection: ProjectionKind,
}

impl Camera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            position: config.position.into(),
            target: config.target.into(),
            up: config.up.into(),
            fovy: config.fovy,
            projection: ProjectionKind::Perspective,
        }
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.target, self.up)
    }

    /// The view matrix with its translation removed, for geometry that must
    /// stay centred on the eye.
    pub fn rotation_only_view(&self) -> Matrix4<f32> {
        let mut view = self.view_matrix();
        view.w = Vector4::new(0.0, 0.0, 0.0, 1.0);
        view
    }

    pub fn projection_matrix(&self, aspect: f32) -> Matrix4<f32> {
        let projection = match self.projection {
            ProjectionKind::Perspective => {
                cgmath::perspective(Deg(self.fovy), aspect, CULL_NEAR, CULL_FAR)
            }
            ProjectionKind::Orthographic => {
                let top = self.fovy / 2.0;
                let right = top * aspect;
                cgmath::ortho(-right, right, -top, top, CULL_NEAR, CULL_FAR)
            }
        };
        OPENGL_TO_WGPU_MATRIX * projection
    }
}

/// Moves a [`Camera`] once per frame, usually from user input.
pub trait CameraController {
    /// Feed a window event. Returns whether the controller used it.
    fn handle_window_event(&mut self, _event: &WindowEvent) -> bool {
        false
    }

    /// Feed raw mouse motion.
    fn handle_mouse(&mut self, _dx: f64, _dy: f64) {}

    fn update(&mut self, camera: &mut Camera, dt: Duration);
}

/// Leaves the camera where it is.
#[derive(Debug, Default)]
pub struct FixedCamera;

impl CameraController for FixedCamera {
    fn update(&mut self, _camera: &mut Camera, _dt: Duration) {}
}

/// Fly camera: WASD to move, Space and Shift for up and down, mouse to look.
#[derive(Debug)]
pub struct FreeCameraController {
    amount_left: f32,
    amount_right: f32,
    amount_forward: f32,
    amount_backward: f32,
    amount_up: f32,
    amount_down: f32,
    rotate_horizontal: f32,
    rotate_vertical: f32,
    speed: f32,
    sensitivity: f32,
}

impl FreeCameraController {
    pub fn new(speed: f32, sensitivity: f32) -> Self {
        Self {
            amount_left: 0.0,
            amount_right: 0.0,
            amount_forward: 0.0,
            amount_backward: 0.0,
            amount_up: 0.0,
            amount_down: 0.0,
            rotate_horizontal: 0.0,
            rotate_vertical: 0.0,
            speed,
            sensitivity,
        }
    }

    pub fn process_keyboard(&mut self, key: KeyCode, state: ElementState) -> bool {
        let amount = if state == ElementState::Pressed {
            1.0
        } else {
            0.0
        };
        match key {
            KeyCode::KeyW | KeyCode::ArrowUp => {
                self.amount_forward = amount;
                true
            }
            KeyCode::KeyS | KeyCode::ArrowDown => {
                self.amount_backward = amount;
                true
            }
            KeyCode::KeyA | KeyCode::ArrowLeft => {
                self.amount_left = amount;
                true
            }
            KeyCode::KeyD | KeyCode::ArrowRight => {
                self.amount_right = amount;
                true
            }
            KeyCode::Space => {
                self.amount_up = amount;
                true
            }
            KeyCode::ShiftLeft => {
                self.amount_down = amount;
                true
            }
            _ => false,
        }
    }
}

impl Default for FreeCameraController {
    fn default() -> Self {
        Self::new(20.0, 0.003)
    }
}

impl CameraController for FreeCameraController {
    fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state,
                        ..
                    },
                ..
            } => self.process_keyboard(*key, *state),
            _ => false,
        }
    }

    fn handle_mouse(&mut self, dx: f64, dy: f64) {
        self.rotate_horizontal += dx as f32;
        self.rotate_vertical += dy as f32;
    }

    fn update(&mut self, camera: &mut Camera, dt: Duration) {
        let dt = dt.as_secs_f32();
        let up = camera.up.normalize();
        let offset = camera.target - camera.position;
        let distance = offset.magnitude().max(f32::EPSILON);
        let forward = offset / distance;
        let right = forward.cross(up).normalize();

        let movement = forward * (self.amount_forward - self.amount_backward)
            + right * (self.amount_right - self.amount_left)
            + up * (self.amount_up - self.amount_down);
        let movement = movement * self.speed * dt;
        camera.position += movement;

        // Mouse deltas are already per frame; no dt scaling.
        let yaw = Rad(-self.rotate_horizontal * self.sensitivity);
        let current_pitch = forward.dot(up).clamp(-1.0, 1.0).asin();
        let pitch = (current_pitch - self.rotate_vertical * self.sensitivity)
            .clamp(-SAFE_FRAC_PI_2, SAFE_FRAC_PI_2)
            - current_pitch;
        let rotation = Matrix4::from_axis_angle(up, yaw) * Matrix4::from_axis_angle(right, Rad(pitch));
        let forward = rotation.transform_vector(forward);
        camera.target = camera.position + forward * distance;

        self.rotate_horizontal = 0.0;
        self.rotate_vertical = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::SquareMatrix;

    fn default_camera() -> Camera {
        Camera::new(&CameraConfig {
            position: [50.0, 50.0, 50.0],
            target: [0.0, 10.0, 0.0],
            up: [0.0, 1.0, 0.0],
            fovy: 90.0,
        })
    }

    #[test]
    fn rotation_only_view_keeps_eye_at_origin() {
        let camera = default_camera();
        let view = camera.rotation_only_view();
        let eye = view.transform_point(Point3::new(0.0, 0.0, 0.0));
        assert!(eye.x.abs() < 1e-6 && eye.y.abs() < 1e-6 && eye.z.abs() < 1e-6);
        assert_ne!(view, Matrix4::identity());
    }

    #[test]
    fn projection_maps_far_plane_to_one() {
        let camera = default_camera();
        let projection = camera.projection_matrix(16.0 / 9.0);
        let far = projection * Vector4::new(0.0, 0.0, -CULL_FAR, 1.0);
        assert!((far.z / far.w - 1.0).abs() < 1e-4);
        let near = projection * Vector4::new(0.0, 0.0, -CULL_NEAR, 1.0);
        assert!((near.z / near.w).abs() < 1e-4);
    }

    #[test]
    fn moving_forward_keeps_the_look_direction() {
        let mut camera = default_camera();
        let before = (camera.target - camera.position).normalize();
        let mut controller = FreeCameraController::new(10.0, 0.0);
        controller.process_keyboard(KeyCode::KeyW, ElementState::Pressed);
        controller.update(&mut camera, Duration::from_secs(1));
        let after = (camera.target - camera.position).normalize();
        assert!((before - after).magnitude() < 1e-5);
        let travelled = camera.position - Point3::new(50.0, 50.0, 50.0);
        assert!((travelled.magnitude() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn fixed_camera_does_not_move() {
        let mut camera = default_camera();
        FixedCamera.update(&mut camera, Duration::from_secs(1));
        assert_eq!(camera, default_camera());
    }
}
