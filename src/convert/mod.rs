// Colour conversion and deinterlacing.

pub mod deinterlace;
pub mod tables;
pub mod yuv;

pub use deinterlace::{deinterlace, deinterlace_buffered, DeinterlaceMethod};
pub use tables::{yuv_to_rgb, LookupTables, TableLayout};
pub use yuv::Converter;
