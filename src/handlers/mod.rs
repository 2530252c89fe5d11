// handlers/mod.rs - Handler tiers
//
// Public (no tenant, no auth) → Tenant (gated by subdomain) → Root (admin token)
pub mod public; // GET /, GET /health
pub mod tenant; // /api/tenant/* behind the tenant gate
pub mod root;   // /api/root/* behind the admin token
