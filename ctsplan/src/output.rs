// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use clap::{Args, ValueEnum};
use miette::{GraphicalTheme, MietteHandlerOpts};
use owo_colors::{OwoColorize, Style, style};
use std::{
    fmt,
    io::{self, BufWriter, Write},
    sync::Once,
};
use tracing::{Event, Level, Subscriber, level_filters::LevelFilter, warn};
use tracing_subscriber::{
    Layer,
    filter::Targets,
    fmt::{FmtContext, FormatEvent, FormatFields, format},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Events logged to this target are printed without an `error:`-style heading.
pub(crate) const NO_HEADING: &str = "ctsplan::no_heading";

/// Environment variable holding a `tracing` targets filter, e.g. `ctsplan_runner=trace`.
const LOG_ENV: &str = "CTSPLAN_LOG";

#[derive(Copy, Clone, Debug, Args)]
#[must_use]
pub(crate) struct OutputOpts {
    /// Verbose output
    #[arg(long, short, env = "CTSPLAN_VERBOSE")]
    pub(crate) verbose: bool,

    /// Produce color output: auto, always, never
    #[arg(
        long,
        value_enum,
        default_value_t,
        hide_possible_values = true,
        value_name = "WHEN",
        env = "CTSPLAN_COLOR"
    )]
    pub(crate) color: Color,
}

impl OutputOpts {
    /// Installs the logger and the diagnostic hook. Only the first call has an effect.
    pub(crate) fn init(self) -> OutputContext {
        let output = OutputContext {
            verbose: self.verbose,
            color: self.color,
        };
        static INIT: Once = Once::new();
        INIT.call_once(|| output.install());
        output
    }
}

/// How ctsplan writes to the terminal.
#[derive(Copy, Clone, Debug)]
#[must_use]
pub struct OutputContext {
    pub(crate) verbose: bool,
    pub(crate) color: Color,
}

impl OutputContext {
    /// Returns the styles used when printing errors to stderr.
    pub fn stderr_styles(&self) -> StderrStyles {
        if self.colorize_stderr() {
            StderrStyles {
                bold: style().bold(),
                warning_text: style().yellow(),
            }
        } else {
            StderrStyles::default()
        }
    }

    fn colorize_stderr(self) -> bool {
        self.color.should_colorize(supports_color::Stream::Stderr)
    }

    fn install(self) {
        let env_filter = std::env::var(LOG_ENV).unwrap_or_default();
        let (targets, invalid) = match log_targets(self.verbose, &env_filter) {
            Ok(targets) => (targets, false),
            Err(targets) => (targets, true),
        };

        let layer = tracing_subscriber::fmt::layer()
            .event_format(HeadingFormat {
                colorize: self.colorize_stderr(),
            })
            .with_writer(io::stderr)
            .with_filter(targets);
        tracing_subscriber::registry().with(layer).init();
        if invalid {
            warn!("ignoring {LOG_ENV}: `{env_filter}` is not a valid filter");
        }

        let theme = diagnostic_theme(
            self.colorize_stderr(),
            supports_unicode::on(supports_unicode::Stream::Stderr),
        );
        // Only fails if a hook was already installed.
        let _ = miette::set_hook(Box::new(move |_| {
            Box::new(MietteHandlerOpts::new().graphical_theme(theme.clone()).build())
        }));
    }
}

/// Picks the log filter: `env_filter` if it is set and valid, otherwise a level chosen by
/// `verbose`. An invalid filter returns the fallback as the error.
fn log_targets(verbose: bool, env_filter: &str) -> Result<Targets, Targets> {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let fallback = Targets::new().with_default(level);
    if env_filter.is_empty() {
        return Ok(fallback);
    }
    env_filter.parse().map_err(|_| fallback)
}

// Pattern errors are reported through miette; they use the same `error:` heading as logs.
fn diagnostic_theme(colorize: bool, unicode: bool) -> GraphicalTheme {
    let mut theme = match (unicode, colorize) {
        (true, true) => GraphicalTheme::unicode(),
        (true, false) => GraphicalTheme::unicode_nocolor(),
        (false, true) => GraphicalTheme::ascii(),
        (false, false) => GraphicalTheme::none(),
    };
    theme.characters.error = "error:".into();
    theme
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
#[must_use]
pub enum Color {
    #[default]
    Auto,
    Always,
    Never,
}

impl Color {
    pub(crate) fn should_colorize(self, stream: supports_color::Stream) -> bool {
        match self {
            Color::Auto => supports_color::on_cached(stream).is_some(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

/// Prints `<level>: <message> <fields>`, leaving out the heading for [`NO_HEADING`] events.
struct HeadingFormat {
    colorize: bool,
}

impl HeadingFormat {
    fn heading(&self, level: Level) -> (&'static str, Style) {
        let (heading, color) = match level {
            Level::ERROR => ("error", style().red().bold()),
            Level::WARN => ("warning", style().yellow().bold()),
            Level::INFO => ("info", style().bold()),
            Level::DEBUG => ("debug", style().bold()),
            Level::TRACE => ("trace", style().dimmed()),
        };
        (heading, if self.colorize { color } else { Style::new() })
    }
}

impl<S, N> FormatEvent<S, N> for HeadingFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        if metadata.target() != NO_HEADING {
            let (heading, style) = self.heading(*metadata.level());
            write!(writer, "{}: ", heading.style(style))?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Styles for messages printed to stderr.
#[derive(Debug, Default)]
pub struct StderrStyles {
    pub(crate) bold: Style,
    pub(crate) warning_text: Style,
}

/// Where standard output goes. Tests capture it.
#[derive(Default)]
pub enum OutputWriter {
    /// Buffered stdout
    #[default]
    Normal,
    /// Output captured
    #[cfg(test)]
    Test {
        /// stdout capture
        stdout: Vec<u8>,
    },
}

impl OutputWriter {
    pub(crate) fn stdout_writer(&mut self) -> Box<dyn Write + '_> {
        match self {
            Self::Normal => Box::new(BufWriter::new(io::stdout().lock())),
            #[cfg(test)]
            Self::Test { stdout } => Box::new(stdout),
        }
    }
}
