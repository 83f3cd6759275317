pub mod command_camera;
pub mod provider;

pub use command_camera::CommandCamera;
pub use provider::CaptureProvider;
