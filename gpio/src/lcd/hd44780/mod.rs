//! HD44780 character LCD module.
//!
//! Only the write path of the 4-bit parallel interface is implemented: the R/W line is expected
//! to be tied to ground, and the busy flag is never read. Every transfer is followed by a fixed
//! delay long enough for the slowest controller, see [driver::HD44780Timings].

pub mod driver;
