//! # Main Display Module
//!
//! Layout of the Metrotune window: tab bar, the active tab's panel, an
//! error banner and the source sidebar.

use iced::widget::{button, column, container, horizontal_space, row, slider, text, text_input, Space};
use iced::{alignment, Alignment, Background, Color, Element, Length, Theme};
use metrotune_core::metronome::{MAX_BPM, MIN_BPM};
use metrotune_core::SourceKind;

use super::{beat_indicator::BeatIndicator, cent_meter::CentMeter};
use crate::{AppDisplayData, Message, Tab};

const ACTIVE: Color = Color::from_rgb(0.2, 0.5, 0.8);
const RUNNING: Color = Color::from_rgb(0.8, 0.2, 0.2);
const IDLE: Color = Color::from_rgb(0.2, 0.6, 0.3);

/// Creates the complete main application view
pub fn create_main_view(data: &AppDisplayData) -> Element<'_, Message> {
    let title = text("Metrotune").size(28);

    let tabs = row![
        tab_button("Metronome", Tab::Metronome, data.tab),
        tab_button("Tuner", Tab::Tuner, data.tab),
    ]
    .spacing(10);

    let panel = match data.tab {
        Tab::Metronome => create_metronome_panel(data),
        Tab::Tuner => create_tuner_panel(data),
    };

    let mut body = column![title, tabs].spacing(15).width(Length::Fill);
    if let Some(message) = &data.error {
        body = body.push(create_error_banner(message));
    }
    body = body.push(panel);

    let main_content = row![body, Space::with_width(10), create_sidebar(data)]
        .align_y(Alignment::Start)
        .padding(20);

    container(main_content)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

fn tab_button(label: &'static str, tab: Tab, selected: Tab) -> Element<'static, Message> {
    let widget = button(text(label).size(16)).padding([8, 20]);
    if tab == selected {
        colored(widget, ACTIVE).into()
    } else {
        widget.on_press(Message::TabSelected(tab)).into()
    }
}

/// Applies a solid background to a button.
fn colored<'a>(
    widget: button::Button<'a, Message>,
    color: Color,
) -> button::Button<'a, Message> {
    widget.style(move |_theme: &Theme, _status| button::Style {
        background: Some(Background::Color(color)),
        text_color: Color::WHITE,
        ..button::Style::default()
    })
}

fn start_stop_button(running: bool, message: Message) -> Element<'static, Message> {
    let (label, color) = if running {
        ("Stop", RUNNING)
    } else {
        ("Start", IDLE)
    };
    let label = text(label)
        .size(20)
        .width(Length::Fill)
        .align_x(alignment::Horizontal::Center);
    colored(button(label).padding([10, 20]), color)
    .width(Length::Fixed(160.0))
    .on_press(message)
    .into()
}

fn create_metronome_panel(data: &AppDisplayData) -> Element<'_, Message> {
    let bpm = data.tempo.bpm();

    let tempo_controls = row![
        button(text("-").size(20)).padding([4, 14]).on_press(Message::TempoStep(-1)),
        slider(MIN_BPM..=MAX_BPM, bpm, Message::TempoChanged).width(Length::Fill),
        button(text("+").size(20)).padding([4, 14]).on_press(Message::TempoStep(1)),
    ]
    .spacing(10)
    .align_y(Alignment::Center);

    let beat_label = match data.current_beat {
        Some(beat) => format!("Beat {}", beat.get()),
        None => "Stopped".to_string(),
    };

    container(
        column![
            text(format!("{} BPM", bpm)).size(48),
            tempo_controls,
            Space::with_height(10),
            BeatIndicator::new(data.current_beat).view(),
            text(beat_label).size(14),
            Space::with_height(10),
            start_stop_button(data.metronome_running, Message::ToggleMetronome),
        ]
        .spacing(10)
        .padding(15)
        .align_x(Alignment::Center),
    )
    .width(Length::Fill)
    .into()
}

fn create_tuner_panel(data: &AppDisplayData) -> Element<'_, Message> {
    let smoothed = data.smoothed_cents();

    let (note_text, freq_text, cents_text) = match &data.last_pitch {
        Some(estimate) => (
            estimate.note.to_string(),
            format!("{:.2} Hz", estimate.frequency_hz),
            format!("{:+.0} cents", smoothed.unwrap_or(estimate.cents as f32)),
        ),
        None => ("--".to_string(), "0.00 Hz".to_string(), "-- cents".to_string()),
    };

    container(
        column![
            text(note_text).size(72),
            row![text(freq_text).size(18), horizontal_space(), text(cents_text).size(18)]
                .width(Length::Fixed(320.0)),
            CentMeter::new(smoothed).view(),
            Space::with_height(10),
            start_stop_button(data.tuner_running, Message::ToggleTuner),
        ]
        .spacing(10)
        .padding(15)
        .align_x(Alignment::Center),
    )
    .width(Length::Fill)
    .into()
}

fn create_error_banner(message: &str) -> Element<'_, Message> {
    container(
        row![
            text(message).size(14).width(Length::Fill),
            button(text("Dismiss").size(12)).on_press(Message::DismissError),
        ]
        .spacing(10)
        .align_y(Alignment::Center),
    )
    .padding(10)
    .width(Length::Fill)
    .style(|_theme: &Theme| container::Style {
        background: Some(Background::Color(Color::from_rgb(0.45, 0.12, 0.12))),
        text_color: Some(Color::WHITE),
        ..container::Style::default()
    })
    .into()
}

/// Source selection: local audio hardware or a device on the network.
fn create_sidebar(data: &AppDisplayData) -> Element<'_, Message> {
    let source_button = |label: &'static str, kind: SourceKind| -> Element<'static, Message> {
        let widget = button(text(label).size(14).width(Length::Fill)).padding([6, 10]);
        if data.source_kind == kind {
            colored(widget, ACTIVE).into()
        } else {
            widget.on_press(Message::SourceSelected(kind)).into()
        }
    };

    let status = match (&data.source_kind, &data.remote_peer) {
        _ if data.connecting => format!("Connecting to {}...", data.remote_address.trim()),
        (SourceKind::Remote, Some(peer)) => format!("Connected to {}", peer),
        _ => "Using this computer".to_string(),
    };
    let connect_message = (!data.connecting).then_some(Message::ConnectRemote);

    let address = text_input("host:port", &data.remote_address)
        .on_input(Message::RemoteAddressChanged)
        .on_submit(Message::ConnectRemote)
        .padding(6)
        .size(14);

    container(
        column![
            text("Source").size(18),
            source_button("Local", SourceKind::Local),
            source_button("Remote", SourceKind::Remote),
            Space::with_height(10),
            text("Device address").size(14),
            address,
            button(text("Connect").size(14).width(Length::Fill))
                .padding([6, 10])
                .on_press_maybe(connect_message),
            Space::with_height(10),
            text(status).size(12),
        ]
        .spacing(10)
        .padding(15),
    )
    .width(Length::Fixed(250.0))
    .height(Length::Fill)
    .into()
}
