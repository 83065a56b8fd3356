pub mod outcome_writer;
pub mod script_reader;
