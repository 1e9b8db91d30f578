/// Project, track and cover data model.
pub mod model;
