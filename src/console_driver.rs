use std::io::{self, Write};

use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term::termcolor::{
    Color, ColorChoice, ColorSpec, StandardStream, WriteColor,
};
use codespan_reporting::term::{self, Config, DisplayStyle};

use log::warn;

use trellis_common::{Driver, IrOutput, OptLevel};

use crate::args::Options;
use crate::message::Messages;

pub struct ConsoleDriver {
    files: SimpleFiles<String, String>,
    writer: StandardStream,
    config: Config,

    dump_ir: bool,
    entry: Option<String>,
    opt_level: OptLevel,
    keep_comments: bool,
}

impl ConsoleDriver {
    pub fn new(files: SimpleFiles<String, String>, options: &Options) -> Self {
        Self {
            files,
            writer: StandardStream::stderr(ColorChoice::Auto),
            config: Config {
                display_style: DisplayStyle::Rich,
                ..Default::default()
            },

            dump_ir: options.dump_ir,
            entry: options.entry.clone(),
            opt_level: options.opt_level(),
            keep_comments: options.keep_comments,
        }
    }

    /// Print every message. Returns how many there were.
    pub fn report(&mut self, messages: Messages) -> anyhow::Result<usize> {
        let count = messages.len();
        for msg in messages.msgs {
            term::emit(&mut self.writer, &self.config, &self.files, &msg)?;
        }
        Ok(count)
    }
}

impl Driver for ConsoleDriver {
    fn output_ir(&mut self, at: IrOutput, data: impl FnOnce() -> String) {
        if !self.dump_ir {
            return;
        }

        let (kind, stage) = match at {
            IrOutput::Ir(stage) => ("ir", stage),
            IrOutput::Asm(stage) => ("asm", stage),
        };

        if let Err(err) = write_stage(&mut self.writer, kind, stage, data()) {
            warn!("could not print the {kind} after {stage}: {err}");
        }
    }

    fn entry_name(&mut self) -> Option<String> {
        self.entry.clone()
    }

    fn opt_level(&mut self) -> OptLevel {
        self.opt_level
    }

    fn keep_comments(&mut self) -> bool {
        self.keep_comments
    }
}

fn write_stage(stream: &mut impl WriteColor, kind: &str, stage: &str, data: String) -> io::Result<()> {
    stream.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
    write!(stream, "note")?;

    stream.reset()?;
    writeln!(stream, ": {kind} after {stage}")?;
    writeln!(stream, "{data}")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};

    use codespan_reporting::term::termcolor::{ColorSpec, NoColor, WriteColor};

    use super::write_stage;

    struct Closed;

    impl Write for Closed {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl WriteColor for Closed {
        fn supports_color(&self) -> bool {
            false
        }

        fn set_color(&mut self, _: &ColorSpec) -> io::Result<()> {
            Ok(())
        }

        fn reset(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn stages_are_labeled() {
        let mut out = NoColor::new(Vec::new());
        write_stage(&mut out, "ir", "scheduling", "return;".into()).unwrap();

        let expected = "note: ir after scheduling\nreturn;\n";
        assert_eq!(expected, String::from_utf8(out.into_inner()).unwrap());
    }

    #[test]
    fn failed_writes_are_reported() {
        let result = write_stage(&mut Closed, "asm", "final", String::new());
        assert_eq!(io::ErrorKind::BrokenPipe, result.unwrap_err().kind());
    }
}
