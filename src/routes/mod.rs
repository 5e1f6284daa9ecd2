pub mod common;
pub mod generated;

pub use common::common_routes;
pub use generated::pipeline_route;
