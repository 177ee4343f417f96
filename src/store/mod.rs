pub(crate) mod table;

pub(crate) use table::{Entry, EntryTable, Outcome};
