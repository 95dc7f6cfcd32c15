pub mod actor;
pub mod request_id;

pub use actor::{Actor, ACTOR_HEADER, ACTOR_ROLE_HEADER};
pub use request_id::{request_id_middleware, REQUEST_ID_HEADER};
