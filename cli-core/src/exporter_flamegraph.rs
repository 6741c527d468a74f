use std::io;
use std::sync::Mutex;

use inferno::flamegraph;

use crate::collate::RankedLine;

/// Renders the ranked lines into an SVG flamegraph. The lines are fed to
/// the renderer in the exact collapsed-stack format the plain-text output
/// uses.
pub fn lines_to_svg( lines: &[ RankedLine ], title: &str, count_name: &str, output: impl io::Write ) {
    lazy_static::lazy_static! {
        static ref PALETTE_MAP: Mutex< flamegraph::color::PaletteMap > = Mutex::new( flamegraph::color::PaletteMap::default() );
    }

    let mut options = flamegraph::Options::default();
    options.colors = flamegraph::color::Palette::Basic( flamegraph::color::BasicPalette::Mem );
    options.bgcolors = Some( flamegraph::color::BackgroundColor::Flat( (255, 255, 255).into() ) );
    options.title = title.to_owned();
    options.count_name = count_name.to_owned();

    let mut palette_map = PALETTE_MAP.lock();
    if let Ok( ref mut palette_map ) = palette_map {
        options.palette_map = Some( palette_map );
    }

    let mut rendered: Vec< String > = lines.iter().map( |line| line.to_string() ).collect();
    rendered.sort_unstable();

    // The error is explicitly ignored so that a recording which matched
    // no allocations doesn't panic the exporter.
    let _ = flamegraph::from_lines( &mut options, rendered.iter().map( |line| line.as_str() ), output );
}
