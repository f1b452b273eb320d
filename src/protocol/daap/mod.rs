//! DAAP/DMAP metadata decoding for RAOP

mod dmap;


pub use dmap::{CONTAINER_HEADER_SIZE, DmapMap, DmapType, DmapValue, decode, tag_type};
