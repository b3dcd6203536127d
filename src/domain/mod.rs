pub mod round;
pub mod problem;
pub mod hint;
pub mod broadcast;
pub mod team;
pub mod admin;

pub use round::*;
pub use problem::*;
pub use hint::*;
pub use broadcast::*;
pub use team::*;
pub use admin::*;
