// handlers/mod.rs - HTTP surface of the gateway
//
// root:     GET /, GET /health (public)
// realtime: POST /realtime/* (called by the transport process)

pub mod realtime;
pub mod root;
