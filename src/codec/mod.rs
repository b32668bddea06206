//! Codec module - structured payload encoding for parcels.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde`
//!
//! Codecs are marker structs with static methods; [`Parcel`](crate::Parcel)
//! uses them through `append_msgpack` / `read_msgpack`.

mod msgpack;

pub use msgpack::MsgPackCodec;
