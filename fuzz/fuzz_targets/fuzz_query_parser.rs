#![no_main]

use fsi::query::{SearchOptions, parse_query};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Fuzz the query parser with arbitrary strings: any input must be
    // accepted or rejected without panicking, and a compiled query must be
    // runnable against arbitrary candidates.
    let options = SearchOptions::default();
    if let Ok(query) = parse_query(data, &options) {
        let _ = query.matches("some/candidate/name.txt");
        let _ = query.rank("name.txt");
    }
});
