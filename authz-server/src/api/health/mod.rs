mod checkers;
mod handlers;
mod models;

pub(crate) use handlers::router;
