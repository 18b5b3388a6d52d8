use core::fmt::Write;

use embedded_graphics::{
    mono_font::{
        MonoFont, MonoTextStyleBuilder,
        ascii::{FONT_9X15, FONT_10X20},
    },
    pixelcolor::BinaryColor,
    prelude::*,
    text::{Baseline, Text, TextStyleBuilder},
};

use crate::traits::{MetricScreen, TextScale};

/// Link indicator lines on metric screens.
pub const LINK_UP_MARK: &str = "--";
pub const LINK_DOWN_MARK: &str = "---";

fn font(scale: TextScale) -> &'static MonoFont<'static> {
    match scale {
        TextScale::Small => &FONT_9X15,
        TextScale::Large => &FONT_10X20,
    }
}

fn line_height(scale: TextScale) -> i32 {
    font(scale).character_size.height as i32
}

/// Draw `text` with its top-left corner at `origin`. Line breaks are honoured.
fn draw_text<D>(
    target: &mut D,
    text: &str,
    origin: Point,
    scale: TextScale,
) -> Result<(), &'static str>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let text_style = MonoTextStyleBuilder::new()
        .font(font(scale))
        .text_color(BinaryColor::On)
        .build();

    let baseline_style = TextStyleBuilder::new().baseline(Baseline::Top).build();

    Text::with_text_style(text, origin, text_style, baseline_style)
        .draw(target)
        .map_err(|_| "Failed to draw text")?;
    Ok(())
}

/// Full-screen status message
pub fn render_status<D>(target: &mut D, text: &str) -> Result<(), &'static str>
where
    D: DrawTarget<Color = BinaryColor>,
{
    target
        .clear(BinaryColor::Off)
        .map_err(|_| "Failed to clear display")?;
    draw_text(target, text, Point::zero(), TextScale::Small)
}

/// Label, link indicator and value of one metric
pub fn render_metric<D>(target: &mut D, screen: &MetricScreen<'_>) -> Result<(), &'static str>
where
    D: DrawTarget<Color = BinaryColor>,
{
    target
        .clear(BinaryColor::Off)
        .map_err(|_| "Failed to clear display")?;

    let small = line_height(TextScale::Small);
    draw_text(target, screen.label, Point::zero(), TextScale::Small)?;

    let mark = if screen.link_up { LINK_UP_MARK } else { LINK_DOWN_MARK };
    draw_text(target, mark, Point::new(0, small), TextScale::Small)?;

    let mut value = heapless::String::<16>::new();
    let _ = write!(value, "{:.2}", screen.value);
    draw_text(target, value.as_str(), Point::new(0, small * 2), screen.scale)
}
