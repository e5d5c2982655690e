pub mod session_client;
