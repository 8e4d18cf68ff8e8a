//! Wire formats spoken with the external discovery program: how it is
//! invoked and how its XML report is read back.

pub mod nmap;
