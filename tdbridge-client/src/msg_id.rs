//! Message-id transcoding between the public numbering and the transport's
//! internal numbering.
//!
//! The transport scales server-assigned message ids by 2^20; the public API
//! surfaces the unscaled value. Both directions are pure and stateless, and
//! must be applied at every boundary crossing: ids entering the system go
//! through [`to_internal`], ids leaving it through [`to_external`].

/// Scale factor between the two id spaces, as a bit shift.
const MESSAGE_ID_SHIFT: u32 = 20;

/// Convert a public message id to the transport's internal id.
pub fn to_internal(external_id: i64) -> i64 {
    external_id << MESSAGE_ID_SHIFT
}

/// Convert a transport-internal message id to the public id.
pub fn to_external(internal_id: i64) -> i64 {
    internal_id >> MESSAGE_ID_SHIFT
}
