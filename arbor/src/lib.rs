pub use arbor_scan::*;
pub use {
    arbor_error as error, arbor_frame as frame, arbor_scan as scan, arbor_select as select,
};
