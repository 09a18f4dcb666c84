//! egui presentation shell.
//!
//! The shell never touches the engine. [`ShellView`] is a snapshot of the
//! session taken once per frame and [`show`] turns clicks back into
//! [`Command`]s for the session to apply.

use crate::app::coordinator::CoordinatorState;
use crate::app::{Command, TourSession};
use crate::assets::AssetSource;
use crate::camera::{compass_heading, compass_rotation, CameraAngles};
use crate::engine::PanoramaEngine;
use crate::scene::{Direction, FloorCatalog, Marker, SceneCatalog, Selection, TimeKey};

#[derive(Debug, Clone, PartialEq)]
pub struct FloorOption {
    pub id: u32,
    pub label: String,
    pub floor_number: u32,
    pub selectable: bool,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeOption {
    pub time: TimeKey,
    pub available: bool,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionOption {
    pub direction: Direction,
    pub available: bool,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShellView {
    pub title: Option<String>,
    pub floors: Vec<FloorOption>,
    pub times: Vec<TimeOption>,
    pub directions: Vec<DirectionOption>,
    pub selection: Option<Selection>,
    pub notice: Option<String>,
    pub error: Option<String>,
    pub no_content: Option<String>,
    /// Engine never came up; replaces the whole shell.
    pub failure: Option<String>,
    pub loading: bool,
    pub camera: CameraAngles,
    pub markers: Vec<Marker>,
    pub auto_rotating: bool,
    pub orientation: bool,
}

impl ShellView {
    pub fn capture<E: PanoramaEngine, S: AssetSource>(session: &TourSession<E, S>) -> Self {
        let coordinator = session.coordinator();
        let catalog = coordinator.catalog();
        let selection = coordinator.selection();
        let floor = selection.and_then(|selection| catalog.floor(selection.floor));
        let camera = coordinator.camera().unwrap_or_default();

        let (no_content, failure) = match coordinator.state() {
            CoordinatorState::NoContent { reason } => (Some(reason.clone()), None),
            CoordinatorState::Failed { message } => (None, Some(message.clone())),
            _ => (None, None),
        };

        let markers: Vec<Marker> = coordinator
            .current_view()
            .map(|view| {
                view.markers
                    .iter()
                    .filter(|marker| camera.sees(marker.yaw, marker.pitch))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Self {
            title: catalog.property.as_ref().map(|property| property.name.clone()),
            floors: floor_options(catalog, selection),
            times: floor.map(|floor| time_options(floor, selection)).unwrap_or_default(),
            directions: floor
                .map(|floor| direction_options(floor, selection))
                .unwrap_or_default(),
            selection,
            notice: session.notice().map(|notice| notice.message.clone()),
            error: coordinator.error().map(str::to_string),
            no_content,
            failure,
            loading: session.is_loading(),
            camera,
            markers,
            auto_rotating: session.inactivity().is_rotating(),
            orientation: session.orientation_active(),
        }
    }
}

pub fn floor_options(catalog: &SceneCatalog, selection: Option<Selection>) -> Vec<FloorOption> {
    catalog
        .floors()
        .iter()
        .map(|floor| FloorOption {
            id: floor.id,
            label: floor.label.clone(),
            floor_number: floor.floor_number,
            selectable: floor.is_selectable(),
            active: selection.is_some_and(|selection| selection.floor == floor.id),
        })
        .collect()
}

/// A time is offered when the floor has it facing any direction.
pub fn time_options(floor: &FloorCatalog, selection: Option<Selection>) -> Vec<TimeOption> {
    TimeKey::ALL
        .into_iter()
        .map(|time| TimeOption {
            time,
            available: !floor.available_directions(time).is_empty(),
            active: selection.is_some_and(|selection| selection.time == time),
        })
        .collect()
}

/// Directions offered at the selected time.
pub fn direction_options(
    floor: &FloorCatalog,
    selection: Option<Selection>,
) -> Vec<DirectionOption> {
    let available = selection
        .map(|selection| floor.available_directions(selection.time))
        .unwrap_or_default();
    Direction::PRIORITY
        .into_iter()
        .map(|direction| DirectionOption {
            direction,
            available: available.contains(&direction),
            active: selection.is_some_and(|selection| selection.direction == direction),
        })
        .collect()
}

pub fn show(ctx: &egui::Context, view: &ShellView) -> Vec<Command> {
    let mut commands = Vec::new();

    if let Some(message) = &view.failure {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(ui.available_height() * 0.4);
                ui.heading("Unable to load the virtual tour");
                ui.colored_label(egui::Color32::LIGHT_RED, message);
            });
        });
        return commands;
    }

    egui::TopBottomPanel::bottom("tour_controls").show(ctx, |ui| {
        ui.horizontal_wrapped(|ui| {
            floor_selector(ui, view, &mut commands);
            ui.separator();
            time_selector(ui, view, &mut commands);
            ui.separator();
            direction_selector(ui, view, &mut commands);
            ui.separator();
            view_controls(ui, view, &mut commands);
        });
    });

    if let Some(title) = &view.title {
        egui::Area::new(egui::Id::new("tour_title"))
            .anchor(egui::Align2::LEFT_TOP, egui::vec2(16.0, 16.0))
            .show(ctx, |ui| {
                ui.label(egui::RichText::new(title).heading().strong());
            });
    }

    if let Some(reason) = &view.no_content {
        egui::Area::new(egui::Id::new("view_placeholder"))
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.heading("View not available");
                    ui.label(reason);
                });
            });
    } else if view.loading {
        egui::Area::new(egui::Id::new("loading_indicator"))
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.spinner();
            });
    }

    if let Some(notice) = &view.notice {
        egui::Area::new(egui::Id::new("fallback_notice"))
            .anchor(egui::Align2::CENTER_TOP, egui::vec2(0.0, 16.0))
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.horizontal(|ui| {
                        ui.label(notice);
                        if ui.small_button("✕").clicked() {
                            commands.push(Command::DismissNotice);
                        }
                    });
                });
            });
    }

    if let Some(error) = &view.error {
        egui::Area::new(egui::Id::new("engine_error"))
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 48.0))
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.colored_label(egui::Color32::LIGHT_RED, "Unable to load this view");
                    ui.label(error);
                });
            });
    }

    egui::Area::new(egui::Id::new("compass"))
        .anchor(egui::Align2::RIGHT_TOP, egui::vec2(-16.0, 16.0))
        .show(ctx, |ui| compass(ui, view.camera.yaw));

    if !view.markers.is_empty() {
        egui::Area::new(egui::Id::new("visible_markers"))
            .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(16.0, -64.0))
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    for marker in &view.markers {
                        let label = ui.label(egui::RichText::new(&marker.label).strong());
                        if let Some(description) = &marker.description {
                            label.on_hover_text(description);
                        }
                    }
                });
            });
    }

    commands
}

fn floor_selector(ui: &mut egui::Ui, view: &ShellView, commands: &mut Vec<Command>) {
    let current = view
        .floors
        .iter()
        .find(|floor| floor.active)
        .map(|floor| format!("{}F", floor.floor_number))
        .unwrap_or_else(|| "Floor".to_string());
    egui::ComboBox::from_id_salt("floor_select")
        .selected_text(current)
        .show_ui(ui, |ui| {
            for floor in &view.floors {
                let response = ui.add_enabled(
                    floor.selectable,
                    egui::SelectableLabel::new(floor.active, &floor.label),
                );
                if response.clicked() && !floor.active {
                    commands.push(Command::SelectFloor(floor.id));
                }
            }
        });
}

fn time_selector(ui: &mut egui::Ui, view: &ShellView, commands: &mut Vec<Command>) {
    for option in &view.times {
        let response = ui
            .add_enabled(
                option.available,
                egui::SelectableLabel::new(option.active, option.time.label()),
            )
            .on_hover_text(option.time.label());
        if response.hovered() && !option.active {
            if let Some(selection) = view.selection {
                commands.push(Command::HoverPreview(Selection {
                    time: option.time,
                    ..selection
                }));
            }
        }
        if response.clicked() {
            commands.push(Command::SelectTime(option.time));
        }
    }
}

fn direction_selector(ui: &mut egui::Ui, view: &ShellView, commands: &mut Vec<Command>) {
    for option in &view.directions {
        let response = ui.add_enabled(
            option.available,
            egui::SelectableLabel::new(option.active, option.direction.label()),
        );
        if response.hovered() && !option.active {
            if let Some(selection) = view.selection {
                commands.push(Command::HoverPreview(Selection {
                    direction: option.direction,
                    ..selection
                }));
            }
        }
        if response.clicked() {
            commands.push(Command::SelectDirection(option.direction));
        }
    }
}

fn view_controls(ui: &mut egui::Ui, view: &ShellView, commands: &mut Vec<Command>) {
    if ui.button("+").on_hover_text("Zoom in").clicked() {
        commands.push(Command::ZoomIn);
    }
    if ui.button("−").on_hover_text("Zoom out").clicked() {
        commands.push(Command::ZoomOut);
    }
    if ui.button("Reset").clicked() {
        commands.push(Command::ResetView);
    }
    if ui.button("Fullscreen").clicked() {
        commands.push(Command::ToggleFullscreen);
    }
    if ui.selectable_label(view.auto_rotating, "Auto-rotate").clicked() {
        commands.push(Command::ToggleAutoRotate);
    }
    if ui.selectable_label(view.orientation, "Gyro").clicked() {
        commands.push(Command::ToggleOrientation);
    }
}

fn compass(ui: &mut egui::Ui, yaw: f32) {
    let (rect, response) = ui.allocate_exact_size(egui::vec2(56.0, 56.0), egui::Sense::hover());
    let painter = ui.painter();
    let center = rect.center();
    let radius = rect.width() * 0.45;
    painter.circle_filled(center, radius, egui::Color32::from_black_alpha(160));
    painter.circle_stroke(center, radius, egui::Stroke::new(1.5, egui::Color32::WHITE));

    // North needle; screen y grows downward.
    let angle = compass_rotation(yaw).to_radians();
    let tip = center + egui::vec2(angle.sin(), -angle.cos()) * (radius - 4.0);
    let needle = egui::Stroke::new(2.5, egui::Color32::from_rgb(245, 158, 11));
    painter.line_segment([center, tip], needle);
    painter.text(
        tip,
        egui::Align2::CENTER_CENTER,
        "N",
        egui::FontId::proportional(11.0),
        egui::Color32::WHITE,
    );
    response.on_hover_text(format!("Heading {:.0}°", compass_heading(yaw)));
}
