//! In-silico PCR: primer binding-site search, duplex thermodynamics and
//! cycle simulation

mod aligner;
mod error;
mod fasta;
mod gel;
mod iupac;
mod simulator;
mod solution;
mod thermo;
mod types;

pub use aligner::*;
pub use error::*;
pub use fasta::*;
pub use gel::*;
pub use iupac::*;
pub use simulator::*;
pub use solution::*;
pub use thermo::*;
pub use types::*;
