//! A toolkit for reading, merging, transforming, optimizing and writing GIF images.
//!
//! The pieces mirror a GIF file's own structure: [`codec`] reads and writes streams to and from
//! bytes, built on [`lzw`] for the compressed pixel data and [`io`] for the sub-block framing
//! underneath that; [`model`] is the in-memory object graph everything else operates on;
//! [`merge`], [`unoptimize`] and [`optimize`] rearrange a [`model::Stream`]'s frames without
//! touching the codec; [`transform`] applies crop/flip/rotate/resize/colour-table edits to
//! individual images.

pub mod codec;
pub mod io;
pub mod lzw;
pub mod merge;
pub mod model;
pub mod optimize;
pub mod transform;
pub mod unoptimize;

pub mod prelude;
