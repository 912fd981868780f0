//! journeysim fabricates customer-journey traffic for a fictional biotech
//! marketing site and forwards it to a Segment-compatible tracking backend.
//! Attribution capture, the event trampoline, scripted journey replay, bulk
//! population generation, and the live simulator all emit through an
//! injected `TrackingSink`, so a missing backend degrades to a no-op.

pub mod attribution;
pub mod config;
pub mod event;
pub mod journey;
pub mod live;
pub mod logging;
pub mod population;
pub mod profile;
pub mod sink;
pub mod store;
pub mod tracker;
