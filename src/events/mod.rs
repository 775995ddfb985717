//! # Events Module
//!
//! Progress reporting from the library to the CLI.
//!
//! Library operations take an `EventSender` (or use `null_sender()` through
//! their plain variants) and never print. The CLI drains the receiver on its
//! own thread to drive a spinner.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::Scan(ScanEvent::Progress(p)) = event {
//!             println!("Walked {} files", p.files_seen);
//!         }
//!     }
//! });
//!
//! pipeline.run_with_events(&store, &sender)?;
//! ```

mod channel;
mod types;

pub use channel::{EventChannel, EventReceiver, EventSender, null_sender};
pub use types::*;
