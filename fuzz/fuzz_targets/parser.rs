#![no_main]

use libfuzzer_sys::fuzz_target;
use loot::{parse, ErrorKind, SymbolTable};

fuzz_target!(|source: &str| {
    let symbols = SymbolTable::new();
    match parse(source, &symbols) {
        Ok(forms) => {
            for form in forms {
                let _ = form.to_string();
            }
        }
        Err(error) => assert!(matches!(error.kind, ErrorKind::Read | ErrorKind::Eof)),
    }
});
