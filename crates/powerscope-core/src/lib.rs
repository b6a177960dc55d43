//! Powerscope Core -- shared foundation for the power inspection engine.
//!
//! This crate provides the device model the tracker and panel crates build
//! on: fixed-point arithmetic aliases, slotmap-keyed device identity, the
//! closed power-capability enum, the classification function, the device
//! table (a stand-in for the host game's object model), and the network
//! membership provider interface.
//!
//! # Key Types
//!
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for all power values.
//! - [`id::DeviceId`] -- stable identity for one powered device.
//! - [`device::PowerCapability`] -- closed capability enum (trader/storage),
//!   resolved once instead of probed per call.
//! - [`device::DeviceTable`] -- registered device types plus live devices.
//! - [`classify::Classification`] -- Producer / Consumer / Storage.
//! - [`net::NetworkProvider`] -- membership lookup for a selected device.

pub mod classify;
pub mod device;
pub mod fixed;
pub mod id;
pub mod net;
