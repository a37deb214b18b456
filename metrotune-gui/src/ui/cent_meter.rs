//! # Cent Meter Widget
//!
//! Horizontal deviation meter for the tuner tab. The needle shows how far
//! the smoothed reading sits from the nearest equal-tempered note, over the
//! -50..+50 cent range a nearest-note reading can take.

use iced::widget::canvas::{self, Geometry, Path, Stroke};
use iced::widget::container;
use iced::{mouse, Color, Element, Point, Rectangle, Renderer, Size, Theme};

/// Half-width of the scale in cents.
const METER_RANGE: f32 = 50.0;

/// Deviation considered in tune.
pub const IN_TUNE_CENTS: f32 = 5.0;

const TICKS: [f32; 5] = [-50.0, -25.0, 0.0, 25.0, 50.0];

pub struct CentMeter {
    /// Smoothed deviation, None while nothing is heard
    cents: Option<f32>,
}

impl CentMeter {
    pub fn new(cents: Option<f32>) -> Self {
        Self { cents }
    }

    pub fn view(self) -> Element<'static, crate::Message> {
        container(
            canvas::Canvas::new(self)
                .width(iced::Length::Fill)
                .height(iced::Length::Fixed(80.0)),
        )
        .into()
    }
}

/// Color for a deviation: green in tune, yellow close, red far off.
pub fn deviation_color(cents: f32) -> Color {
    if cents.abs() < IN_TUNE_CENTS {
        Color::from_rgb8(0x34, 0xDB, 0x98)
    } else if cents.abs() < 20.0 {
        Color::from_rgb8(0xFF, 0xC3, 0x00)
    } else {
        Color::from_rgb8(0xFF, 0x33, 0x33)
    }
}

fn cents_to_x(cents: f32, width: f32) -> f32 {
    let clamped = cents.clamp(-METER_RANGE, METER_RANGE);
    (clamped + METER_RANGE) / (2.0 * METER_RANGE) * width
}

impl<Message> canvas::Program<Message> for CentMeter {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());

        let background = Path::rectangle(Point::ORIGIN, bounds.size());
        frame.fill(&background, Color::from_rgb8(0x40, 0x40, 0x40));

        let band_left = cents_to_x(-IN_TUNE_CENTS, bounds.width);
        let band_right = cents_to_x(IN_TUNE_CENTS, bounds.width);
        let band = Path::rectangle(
            Point::new(band_left, 0.0),
            Size::new(band_right - band_left, bounds.height),
        );
        frame.fill(&band, Color::from_rgba8(0x34, 0xDB, 0x98, 0.25));

        for tick in TICKS {
            let x = cents_to_x(tick, bounds.width);
            let length = if tick == 0.0 {
                bounds.height
            } else {
                bounds.height * 0.3
            };
            let line = Path::line(Point::new(x, bounds.height - length), Point::new(x, bounds.height));
            frame.stroke(
                &line,
                Stroke::default()
                    .with_width(if tick == 0.0 { 2.0 } else { 1.0 })
                    .with_color(Color::WHITE),
            );
        }

        if let Some(cents) = self.cents {
            let x = cents_to_x(cents, bounds.width);
            let needle = Path::rectangle(Point::new(x - 2.0, 0.0), Size::new(4.0, bounds.height));
            frame.fill(&needle, deviation_color(cents));
        }

        vec![frame.into_geometry()]
    }
}
