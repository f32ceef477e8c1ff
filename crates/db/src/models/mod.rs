pub mod attendance;
pub mod check_in_request;
pub mod participant;
pub mod resource;
pub mod status;
