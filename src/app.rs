use std::time::Duration;

use crate::pipeline::{Command, WorkerHandle};
use crate::session::{Notice, SessionState};
use crate::utils::*;

pub struct TryOnApp {
    shared_state: SharedState,
    worker: WorkerHandle,
    texture: Option<egui::TextureHandle>,
    texture_frame: u64,
}

impl TryOnApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        shared_state: SharedState,
        worker: WorkerHandle,
    ) -> Self {
        Self {
            shared_state,
            worker,
            texture: None,
            texture_frame: 0,
        }
    }

    // upload the latest composited frame if the worker produced a new one
    fn refresh_texture(&mut self, ctx: &egui::Context) {
        let state = lock_state(&self.shared_state);
        if state.frame_id == self.texture_frame {
            return;
        }
        let Some(image) = state.image.as_ref() else {
            return;
        };

        let size = [image.width() as usize, image.height() as usize];
        let ui_image = egui::ColorImage::from_rgba_unmultiplied(size, image.as_raw());
        self.texture_frame = state.frame_id;
        drop(state);

        match self.texture.as_mut() {
            Some(texture) => texture.set(ui_image, egui::TextureOptions::default()),
            None => {
                self.texture =
                    Some(ctx.load_texture("surface", ui_image, egui::TextureOptions::default()))
            }
        }
    }
}

fn notice_color(notice: &Notice) -> egui::Color32 {
    match notice {
        Notice::Loading | Notice::NoFace => egui::Color32::WHITE,
        Notice::InitFailed(_) | Notice::SpriteFailed(_) => egui::Color32::from_rgb(255, 90, 90),
    }
}

impl eframe::App for TryOnApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        self.refresh_texture(ctx);

        let (styles, selected, notices, fps, resolution, ready) = {
            let state = lock_state(&self.shared_state);
            (
                state.styles.clone(),
                state.selected_style,
                state.notices.clone(),
                state.fps,
                state.resolution,
                matches!(state.session, SessionState::Ready { .. }),
            )
        };

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Virtual Glasses Try-On");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Close").clicked() {
                        frame.close();
                    }
                });
            });
        });

        egui::SidePanel::left("side_panel").show(ctx, |ui| {
            ui.heading("Choose Your Style");
            egui::ScrollArea::vertical().show(ui, |ui| {
                for style in &styles {
                    let response = ui.add_enabled(
                        ready,
                        egui::SelectableLabel::new(style.id == selected, style.name.as_str()),
                    );
                    if response.clicked() && style.id != selected {
                        self.worker.send(Command::SelectStyle(style.id));
                    }
                }

                ui.separator();
                ui.label(format!("FPS: {:.1}", fps.unwrap_or(0.0)));
                let (w, h) = resolution.unwrap_or((0, 0));
                ui.label(format!("Resolution: {}x{}", w, h));
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            for notice in &notices {
                ui.colored_label(notice_color(notice), notice.to_string());
            }

            if let Some(texture) = &self.texture {
                // fit the surface to the panel width
                let [w, h] = texture.size();
                let ui_img_width = ui.available_width();
                let ui_img_height = ui_img_width * h as f32 / w.max(1) as f32;
                ui.image(texture, egui::Vec2::new(ui_img_width, ui_img_height));
            }
        });

        ctx.request_repaint_after(Duration::from_millis(33));
    }

    fn on_close_event(&mut self) -> bool {
        self.worker.stop();
        true
    }
}
