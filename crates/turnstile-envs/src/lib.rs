//! Reference environments for the Turnstile turn-coordination server.
//!
//! - [`TicTacToe`]: two agents alternate on an N×N board.
//! - [`Countdown`]: every agent moves simultaneously for a fixed number
//!   of steps.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod countdown;
pub mod tic_tac_toe;

pub use countdown::Countdown;
pub use tic_tac_toe::{Board, TicTacToe, TicTacToeInfo, EMPTY};
