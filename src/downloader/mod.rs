// SPDX-License-Identifier: GPL-3.0-only
pub mod client;
pub mod traits;

pub use client::{HttpClient, USER_AGENT};
pub use traits::Downloader;
