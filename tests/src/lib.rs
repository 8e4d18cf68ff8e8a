#![cfg(test)]
//! End-to-end tests of the engine against fake discovery, tool, and probe
//! backends. Nothing here touches the network or spawns external programs.

mod automation;
mod scan;
mod support;
