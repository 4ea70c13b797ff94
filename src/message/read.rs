use codespan_reporting::diagnostic::{Diagnostic, Label};

use super::MessageAdder;

const EXPECTED: &str = "ER00";
const INVALID_TOKEN: &str = "ER01";
const NUMBER_RANGE: &str = "ER02";
const RESERVED_NAME: &str = "ER03";
const DUPLICATE: &str = "ER04";
const UNDEFINED_LABEL: &str = "ER05";
const BAD_ESCAPE: &str = "ER06";

impl<'a> MessageAdder<'a> {
    pub fn read_expected(&mut self, what: &str) {
        let labels = vec![Label::primary(self.at.file, self.at).with_message(format!("expected {what} here"))];

        self.add(
            Diagnostic::error()
                .with_code(EXPECTED)
                .with_message(format!("expected {what}"))
                .with_labels(labels),
        );
    }

    pub fn read_invalid_token(&mut self) {
        let labels = vec![Label::primary(self.at.file, self.at)];

        self.add(
            Diagnostic::error()
                .with_code(INVALID_TOKEN)
                .with_message("invalid token")
                .with_labels(labels),
        );
    }

    pub fn read_number_out_of_range(&mut self) {
        let labels = vec![Label::primary(self.at.file, self.at)];
        let notes = vec![String::from("integers are signed and 64 bits wide")];

        self.add(
            Diagnostic::error()
                .with_code(NUMBER_RANGE)
                .with_message("integer literal out of range")
                .with_labels(labels)
                .with_notes(notes),
        );
    }

    pub fn read_reserved_name(&mut self, name: &str) {
        let labels = vec![Label::primary(self.at.file, self.at)];
        let notes = vec![String::from(
            "names starting with an underscore are reserved for the compiler, except for function names",
        )];

        self.add(
            Diagnostic::error()
                .with_code(RESERVED_NAME)
                .with_message(format!("the name '{name}' is reserved"))
                .with_labels(labels)
                .with_notes(notes),
        );
    }

    pub fn read_duplicate(&mut self, what: &str, name: &str) {
        let labels = vec![Label::primary(self.at.file, self.at).with_message("defined again here")];

        self.add(
            Diagnostic::error()
                .with_code(DUPLICATE)
                .with_message(format!("the {what} '{name}' is defined more than once"))
                .with_labels(labels),
        );
    }

    pub fn read_undefined_label(&mut self, label: &str) {
        let labels = vec![Label::primary(self.at.file, self.at)];

        self.add(
            Diagnostic::error()
                .with_code(UNDEFINED_LABEL)
                .with_message(format!("jump to the undefined label '{label}'"))
                .with_labels(labels),
        );
    }

    pub fn read_bad_escape(&mut self) {
        let labels = vec![Label::primary(self.at.file, self.at)];
        let notes = vec![String::from("the escapes are \\\\, \\\", \\n and \\t")];

        self.add(
            Diagnostic::error()
                .with_code(BAD_ESCAPE)
                .with_message("unknown escape sequence")
                .with_labels(labels)
                .with_notes(notes),
        );
    }
}
