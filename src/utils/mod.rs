// SPDX-License-Identifier: GPL-3.0-only
pub mod checksum;
pub mod path_sanitizer;

pub use checksum::sha256_hex;
pub use path_sanitizer::{blob_path, filename_from_url};
