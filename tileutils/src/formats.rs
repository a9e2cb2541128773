use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Mbtiles,
    Pmtiles,
    Xyz,
}

/// Resolves an explicit format flag, falling back to the path suffix.
pub fn deduce_format(format: Option<Format>, path: &str) -> Option<Format> {
    if format.is_some() {
        return format;
    }
    if path.ends_with(".mbtiles") {
        return Some(Format::Mbtiles);
    }
    if path.ends_with(".pmtiles") {
        return Some(Format::Pmtiles);
    }
    None
}

/// A tick-based spinner for traversals of unknown length.
pub fn spinner() -> indicatif::ProgressBar {
    let progress = indicatif::ProgressBar::new_spinner();
    if let Ok(style) =
        indicatif::ProgressStyle::with_template("{spinner} {human_pos} tiles ({per_sec})")
    {
        progress.set_style(style);
    }
    progress
}
