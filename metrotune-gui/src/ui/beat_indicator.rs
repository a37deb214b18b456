//! Row of beat lamps for the metronome tab. The lamp for the beat last
//! sounded is lit; the downbeat lamp lights in the accent color.

use iced::widget::canvas::{self, Geometry, Path, Stroke};
use iced::{mouse, Color, Element, Length, Point, Rectangle, Renderer, Theme};
use metrotune_core::metronome::BEATS_PER_BAR;
use metrotune_core::BeatNumber;

const ACCENT: Color = Color::from_rgb(0.95, 0.45, 0.2);
const NORMAL: Color = Color::from_rgb(0.2, 0.6, 0.95);
const UNLIT: Color = Color::from_rgb(0.3, 0.3, 0.3);

pub struct BeatIndicator {
    current: Option<BeatNumber>,
}

impl BeatIndicator {
    pub fn new(current: Option<BeatNumber>) -> Self {
        Self { current }
    }

    pub fn view(self) -> Element<'static, crate::Message> {
        canvas::Canvas::new(self)
            .width(Length::Fill)
            .height(Length::Fixed(70.0))
            .into()
    }

    fn lamp_color(&self, beat: u8) -> Option<Color> {
        let current = self.current?;
        if current.get() != beat {
            return None;
        }
        Some(if current.is_downbeat() { ACCENT } else { NORMAL })
    }
}

impl<Message> canvas::Program<Message> for BeatIndicator {
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

        let slot = bounds.width / f32::from(BEATS_PER_BAR);
        let radius = (slot.min(bounds.height) / 2.0 - 6.0).max(4.0);
        let center_y = bounds.height / 2.0;

        for beat in 1..=BEATS_PER_BAR {
            let center = Point::new(slot * (f32::from(beat) - 0.5), center_y);
            let lamp = Path::circle(center, radius);
            match self.lamp_color(beat) {
                Some(color) => frame.fill(&lamp, color),
                None => frame.stroke(
                    &lamp,
                    Stroke::default().with_width(2.0).with_color(UNLIT),
                ),
            }
        }

        vec![frame.into_geometry()]
    }
}
