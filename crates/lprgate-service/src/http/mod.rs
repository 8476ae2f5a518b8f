pub mod server;

mod apikey_endpoint;
mod auth;
mod plate_log_endpoint;
mod recognize_endpoint;
mod reply;
mod system_endpoint;
mod user_endpoint;
