//! A simulated internet speed test with a switchable UI language.
//!
//! [`app::App`] wires the two independent halves together: the
//! [`i18n::Translator`], which localizes the [`page::Page`], and the
//! [`speedtest::Sequencer`], which runs the measurement phases and reports
//! through the page as a [`speedtest::DisplaySink`].

pub mod app;
pub mod config;
pub mod i18n;
pub mod page;
pub mod retry;
pub mod speedtest;
pub mod storage;
