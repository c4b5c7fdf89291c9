#![deny(
    clippy::mutable_key_type,
    clippy::map_entry,
    clippy::boxed_local,
    clippy::let_unit_value,
    clippy::redundant_allocation,
    clippy::bool_comparison,
    clippy::bind_instead_of_map,
    clippy::vec_box,
    clippy::while_let_loop,
    clippy::useless_asref,
    clippy::repeat_once,
    clippy::deref_addrof,
    clippy::suspicious_map,
    clippy::arc_with_non_send_sync,
    clippy::single_char_pattern,
    clippy::for_kv_map,
    clippy::let_and_return,
    clippy::iter_nth,
    clippy::iter_cloned_collect,
    clippy::bytes_nth,
    clippy::deprecated_clippy_cfg_attr,
    clippy::match_result_ok,
    clippy::cmp_owned,
    clippy::cmp_null,
    clippy::op_ref
)]

pub mod bench;
pub mod dbscan;
pub mod error;
pub mod export;
pub mod fallback;
pub mod geometry;
pub mod models;
pub mod pipeline;
pub mod spatial;

pub const WGS_84_SRID: u32 = 4326;

/// Mean earth radius in meters, shared by every haversine computation.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
