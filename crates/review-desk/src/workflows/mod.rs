pub mod intake;
pub mod review;
