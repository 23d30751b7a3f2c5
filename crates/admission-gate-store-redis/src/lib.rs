// crates/admission-gate-store-redis/src/lib.rs
// ============================================================================
// Module: Admission Gate Redis Store
// Description: Redis-backed idempotency store.
// Purpose: Share idempotency records across gateway replicas.
// Dependencies: admission-gate-core, redis
// ============================================================================

//! ## Overview
//! [`RedisIdempotencyStore`] implements
//! [`admission_gate_core::IdempotencyStore`] over a multiplexed, automatically
//! reconnecting Redis connection. Records are written with `SET .. EX`, leases
//! with `SET .. NX EX`, so expiry is enforced server-side.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::RedisIdempotencyStore;
