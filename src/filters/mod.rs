pub mod motion;
pub mod pose_ekf;

pub use motion::MotionInput;
pub use pose_ekf::PoseEkf;
