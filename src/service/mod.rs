// Visit relay service
pub mod dispatch;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod monitor;
pub mod routes;
pub mod server;
pub mod state;
pub mod token;
pub mod upstream;

#[cfg(test)]
pub mod tests;

pub use server::AxumServer;
pub use state::AppState;
