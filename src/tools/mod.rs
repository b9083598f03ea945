pub mod ask;
pub mod listmodels;
pub mod review;
