// handlers/root/mod.rs - Operator handlers (admin bearer token required)

pub mod tenant; // /api/root/tenant/*
