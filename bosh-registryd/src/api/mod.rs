pub mod discovery;
pub mod routes;
