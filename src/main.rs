use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use futures::SinkExt;
use iced::widget::image::Handle;
use iced::widget::{
    button, canvas, column, container, progress_bar, row, scrollable, stack, text, text_input,
};
use iced::{event, window, Alignment, ContentFit, Element, Length, Subscription, Task, Theme};
use iced_aw::Wrap;
use rfd::FileDialog;

mod cli;
mod error;
mod logging;
mod pipeline;
mod state;
mod ui;

use error::Error;
use pipeline::batch::{apply_to_all, BatchProgress, BatchReport};
use pipeline::compose::{compose_async, ComposeItem, CompositionResult, MAX_OUTPUT_WIDTH, MAX_PADDING};
use pipeline::crop::crop_async;
use state::data::{CropResult, ImageId, ImageRecord};
use state::edit::{CropRectangle, Edge, EditSession};
use state::library::{self, ImageCollection, ImportResult, IMAGE_EXTENSIONS};
use state::presets::{builtin_presets, CropPreset, PresetId, PresetStore, Settings};
use ui::canvas::{CropOverlay, PointerInput};
use ui::gesture::GestureController;

/// Largest on-screen size of the crop editor surface
const EDITOR_MAX_WIDTH: f32 = 720.0;
const EDITOR_MAX_HEIGHT: f32 = 540.0;
/// Width of a gallery card
const CARD_WIDTH: f32 = 160.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Input,
    Edit,
    Compose,
}

/// Result of the background font lookup
#[derive(Clone)]
pub struct LoadedFont(Option<ab_glyph::FontArc>);

impl std::fmt::Debug for LoadedFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(_) => f.write_str("LoadedFont(found)"),
            None => f.write_str("LoadedFont(none)"),
        }
    }
}

/// Events streamed from a running batch crop
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Progress(BatchProgress),
    Finished(BatchReport),
    Crashed(String),
}

/// Application messages (events)
#[derive(Debug, Clone)]
pub enum Message {
    TabSelected(Tab),
    /// User clicked "Add images"
    PickFiles,
    /// User clicked "Add folder"
    PickFolder,
    FileDropped(PathBuf),
    /// Background read completed
    FilesRead(ImportResult),
    EditImage(ImageId),
    DeleteImage(ImageId),
    CloseEditor,
    Pointer(PointerInput),
    Frame(Instant),
    EdgeInput(Edge, String),
    CommentChanged(String),
    PresetSelected(PresetId),
    PresetNameChanged(String),
    SavePreset,
    DeletePreset(PresetId),
    ApplyCrop,
    Cropped {
        id: ImageId,
        comment: String,
        result: Result<CropResult, String>,
    },
    ApplyToAll,
    Batch(BatchEvent),
    MaxWidthChanged(String),
    PaddingChanged(String),
    Compose,
    Composed(Result<CompositionResult, String>),
    SaveResult,
    FontLoaded(LoadedFont),
}

/// The image currently open in the crop editor
struct Editor {
    session: EditSession,
    handle: Handle,
    dimensions: (u32, u32),
    /// Text of the edge fields, in `Edge::ALL` order
    readouts: [String; 4],
}

impl Editor {
    fn refresh_readouts(&mut self) {
        for (readout, edge) in self.readouts.iter_mut().zip(Edge::ALL) {
            *readout = format!("{:.1}", self.session.rect.edge(edge));
        }
    }

    /// On-screen size keeping the image's aspect ratio
    fn surface_size(&self) -> (f32, f32) {
        let (w, h) = (self.dimensions.0.max(1) as f32, self.dimensions.1.max(1) as f32);
        let scale = (EDITOR_MAX_WIDTH / w).min(EDITOR_MAX_HEIGHT / h);
        (w * scale, h * scale)
    }
}

/// Main application state
struct Capstack {
    images: ImageCollection,
    thumbnails: HashMap<ImageId, Handle>,
    crop_previews: HashMap<ImageId, Handle>,
    store: Option<PresetStore>,
    settings: Settings,
    presets: Vec<CropPreset>,
    tab: Tab,
    editor: Option<Editor>,
    gestures: GestureController,
    /// Rectangle a fresh edit session starts from
    seed: CropRectangle,
    preset_name: String,
    batch_progress: Option<f32>,
    composing: bool,
    result: Option<(CompositionResult, Handle)>,
    max_width_field: String,
    padding_field: String,
    /// `None` while the lookup is still running
    font: Option<LoadedFont>,
    /// Status message to display to the user
    status: String,
}

impl Capstack {
    fn new(files: Vec<PathBuf>) -> (Self, Task<Message>) {
        let store = match PresetStore::open_default() {
            Ok(store) => Some(store),
            Err(e) => {
                log::error!("❌ Could not open preset store, presets will not persist: {}", e);
                PresetStore::in_memory().ok()
            }
        };
        let app = Self::with_store(store);

        // Font lookup walks the system font folders, keep it off the UI thread
        let mut tasks = vec![Task::perform(
            load_font_async(app.settings.font_path.clone()),
            Message::FontLoaded,
        )];
        // Files passed on the command line are imported right away
        if !files.is_empty() {
            tasks.push(Task::perform(read_files_async(files), Message::FilesRead));
        }

        log::info!("🎨 Capstack ready");
        (app, Task::batch(tasks))
    }

    /// State loaded from `store`, with no background work started
    fn with_store(store: Option<PresetStore>) -> Self {
        let settings = store
            .as_ref()
            .and_then(|s| s.load_settings().map_err(|e| log::warn!("⚠️  {}", e)).ok())
            .unwrap_or_default();
        let presets = store
            .as_ref()
            .and_then(|s| s.list().map_err(|e| log::warn!("⚠️  {}", e)).ok())
            .unwrap_or_else(builtin_presets);

        Capstack {
            images: ImageCollection::new(),
            thumbnails: HashMap::new(),
            crop_previews: HashMap::new(),
            store,
            max_width_field: settings.max_width.to_string(),
            padding_field: settings.padding.to_string(),
            settings,
            presets,
            tab: Tab::Input,
            editor: None,
            gestures: GestureController::new(),
            seed: CropRectangle::default(),
            preset_name: String::new(),
            batch_progress: None,
            composing: false,
            result: None,
            font: None,
            status: "Add screenshots to get started.".to_string(),
        }
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::TabSelected(tab) => {
                self.tab = tab;
            }
            Message::PickFiles => {
                // Show the native file picker dialog
                let files = FileDialog::new()
                    .set_title("Select screenshots")
                    .add_filter("Images", IMAGE_EXTENSIONS)
                    .pick_files();

                if let Some(paths) = files {
                    // Read in the background, results come back as FilesRead
                    self.status = format!("Reading {} files...", paths.len());
                    return Task::perform(read_files_async(paths), Message::FilesRead);
                }
            }
            Message::PickFolder => {
                let folder = FileDialog::new()
                    .set_title("Select a folder with screenshots")
                    .pick_folder();

                if let Some(folder) = folder {
                    self.status = format!("Importing from {}...", folder.display());
                    return Task::perform(import_folder_async(folder), Message::FilesRead);
                }
            }
            Message::FileDropped(path) => {
                if path.is_dir() {
                    return Task::perform(import_folder_async(path), Message::FilesRead);
                }
                if library::has_image_extension(&path) {
                    return Task::perform(read_files_async(vec![path]), Message::FilesRead);
                }
                self.status = format!("Not an image: {}", path.display());
            }
            Message::FilesRead(result) => {
                let count = result.files.len();
                // Keep a display handle per image for the gallery and the editor
                for file in result.files {
                    let handle = Handle::from_bytes(file.bytes.to_vec());
                    let id = self.images.import(file.bytes, Some(file.label));
                    self.thumbnails.insert(id, handle);
                }

                self.status = if result.skipped_count > 0 {
                    format!(
                        "Added {} images, skipped {} unreadable files.",
                        count, result.skipped_count
                    )
                } else {
                    format!("Added {} images.", count)
                };
            }
            Message::EditImage(id) => {
                self.open_editor(id);
            }
            Message::DeleteImage(id) => {
                if self.delete_image(id) {
                    self.status = "Image deleted.".to_string();
                }
            }
            Message::CloseEditor => {
                self.close_editor();
                self.tab = Tab::Input;
            }
            Message::Pointer(input) => {
                let Some(editor) = self.editor.as_mut() else {
                    return Task::none();
                };
                match input {
                    PointerInput::Pressed { press, surface } => {
                        self.gestures.press(press, surface, &editor.session);
                    }
                    PointerInput::Moved { pointer, position } => {
                        self.gestures.pointer_move(pointer, position, &mut editor.session);
                    }
                    PointerInput::Released(pointer) => {
                        if self.gestures.release(pointer) {
                            editor.refresh_readouts();
                        }
                    }
                    PointerInput::Cancelled(pointer) => {
                        if self.gestures.cancel(pointer) {
                            editor.refresh_readouts();
                        }
                    }
                }
            }
            Message::Frame(_) => {
                if self.gestures.take_frame_refresh() {
                    if let Some(editor) = self.editor.as_mut() {
                        editor.refresh_readouts();
                    }
                }
            }
            Message::EdgeInput(edge, value) => {
                if let Some(editor) = self.editor.as_mut() {
                    if let Ok(parsed) = value.trim().parse::<f64>() {
                        editor.session.rect.set_edge(edge, parsed);
                        editor.refresh_readouts();
                    }
                    // Keep what the user is typing in the focused field
                    if let Some(index) = Edge::ALL.iter().position(|e| *e == edge) {
                        editor.readouts[index] = value;
                    }
                }
            }
            Message::CommentChanged(comment) => {
                if let Some(editor) = self.editor.as_mut() {
                    editor.session.comment = comment;
                }
            }
            Message::PresetSelected(id) => {
                if let Some(preset) = self.presets.iter().find(|p| p.id == id) {
                    self.seed = preset.area;
                    if let Some(editor) = self.editor.as_mut() {
                        editor.session.load_preset(preset);
                        editor.refresh_readouts();
                    }
                    self.status = format!("Preset: {}", preset.name);
                }
            }
            Message::PresetNameChanged(name) => {
                self.preset_name = name;
            }
            Message::SavePreset => {
                let area = self.current_rect();
                let saved = match &self.store {
                    Some(store) => store.save(&self.preset_name, area).and_then(|_| store.list()),
                    None => Err(Error::Io(std::io::Error::other("preset store unavailable"))),
                };
                match saved {
                    Ok(presets) => {
                        self.presets = presets;
                        self.preset_name.clear();
                        self.status = "Preset saved.".to_string();
                    }
                    Err(e) => self.status = format!("Could not save preset: {}", e),
                }
            }
            Message::DeletePreset(id) => {
                if let Some(store) = &self.store {
                    match store.delete(&id).and_then(|_| store.list()) {
                        Ok(presets) => {
                            self.presets = presets;
                            self.status = "Preset deleted.".to_string();
                        }
                        Err(e) => self.status = format!("Could not delete preset: {}", e),
                    }
                }
            }
            Message::ApplyCrop => {
                let Some(editor) = &self.editor else {
                    return Task::none();
                };
                let Some(record) = self.images.get(editor.session.image_id) else {
                    return Task::none();
                };

                // The comment is captured now; edits made while cropping do not apply
                let id = record.id;
                let comment = editor.session.comment.clone();
                self.status = "Cropping...".to_string();
                return Task::perform(
                    crop_async(record.source.clone(), editor.session.rect, self.settings.jpeg_quality),
                    move |result| Message::Cropped {
                        id,
                        comment: comment.clone(),
                        result: result.map_err(|e| e.to_string()),
                    },
                );
            }
            Message::Cropped { id, comment, result } => match result {
                Ok(crop) => {
                    self.seed = crop.area;
                    let preview = Handle::from_bytes(crop.jpeg.clone());
                    if self.images.apply_crop(id, crop, comment) {
                        self.crop_previews.insert(id, preview);
                        if self.editor.as_ref().map(|e| e.session.image_id) == Some(id) {
                            self.close_editor();
                            self.tab = Tab::Input;
                        }
                        self.status = "Crop applied.".to_string();
                    } else {
                        self.status = "Image was deleted before the crop finished.".to_string();
                    }
                }
                Err(e) => {
                    log::error!("❌ Crop of {} failed: {}", id, e);
                    self.status = format!("Crop failed: {}", e);
                }
            },
            Message::ApplyToAll => {
                if self.batch_progress.is_some() {
                    return Task::none();
                }
                let items: Vec<(ImageId, Arc<[u8]>)> = self
                    .images
                    .iter()
                    .map(|record| (record.id, record.source.clone()))
                    .collect();
                if items.is_empty() {
                    self.status = "No images to crop.".to_string();
                    return Task::none();
                }

                // Snapshot the rectangle so edits mid-batch do not leak in
                let rect = self.current_rect();
                self.seed = rect;
                self.batch_progress = Some(0.0);
                return Task::run(
                    batch_stream(items, rect, self.settings.jpeg_quality),
                    Message::Batch,
                );
            }
            Message::Batch(event) => match event {
                BatchEvent::Progress(progress) => {
                    self.batch_progress = Some(progress.fraction());
                    self.status = format!("Cropping {}/{}...", progress.completed, progress.total);
                }
                BatchEvent::Finished(report) => {
                    let failed = report.failed_ids().len();
                    let stored = self.store_batch(report);
                    self.batch_progress = None;
                    self.status = if failed == 0 {
                        format!("Cropped {} images.", stored)
                    } else {
                        format!("Cropped {} images, {} could not be decoded.", stored, failed)
                    };
                }
                BatchEvent::Crashed(e) => {
                    log::error!("❌ Batch crop stopped: {}", e);
                    self.batch_progress = None;
                    self.status = format!("Batch crop failed: {}", e);
                }
            },
            Message::MaxWidthChanged(value) => {
                self.max_width_field = value;
            }
            Message::PaddingChanged(value) => {
                self.padding_field = value;
            }
            Message::Compose => {
                if self.composing {
                    return Task::none();
                }
                let items: Vec<ComposeItem> = self.images.cropped().filter_map(ComposeItem::from_record).collect();
                if items.is_empty() {
                    self.status = Error::NothingToCompose.to_string();
                    return Task::none();
                }

                // Blank or invalid fields fall back to the defaults
                let defaults = Settings::default();
                self.settings.max_width =
                    Settings::parse_field(&self.max_width_field, defaults.max_width, MAX_OUTPUT_WIDTH);
                self.settings.padding = Settings::parse_field(&self.padding_field, defaults.padding, MAX_PADDING);
                self.max_width_field = self.settings.max_width.to_string();
                self.padding_field = self.settings.padding.to_string();
                if let Some(store) = &self.store {
                    if let Err(e) = store.save_settings(&self.settings) {
                        log::warn!("⚠️  Could not save settings: {}", e);
                    }
                }

                let font = self.font.clone().and_then(|loaded| loaded.0);
                self.composing = true;
                self.status = "Composing...".to_string();
                return Task::perform(
                    compose_async(items, self.settings.max_width, self.settings.padding, font),
                    |result| Message::Composed(result.map_err(|e| e.to_string())),
                );
            }
            Message::Composed(result) => {
                self.composing = false;
                match result {
                    Ok(composition) => {
                        self.status = format!("Composed {}x{}.", composition.width, composition.height);
                        let handle = Handle::from_bytes(composition.png.clone());
                        self.result = Some((composition, handle));
                    }
                    Err(e) => self.status = format!("Compose failed: {}", e),
                }
            }
            Message::SaveResult => {
                let Some((composition, _)) = &self.result else {
                    return Task::none();
                };
                let file_name = cli::default_output_name().to_string_lossy().to_string();
                let target = FileDialog::new()
                    .set_title("Save composed image")
                    .set_file_name(file_name)
                    .add_filter("PNG", &["png"])
                    .save_file();

                if let Some(path) = target {
                    self.status = match std::fs::write(&path, &composition.png) {
                        Ok(()) => {
                            log::info!("💾 Saved {}", path.display());
                            format!("Saved {}", path.display())
                        }
                        Err(e) => format!("Could not save: {}", e),
                    };
                }
            }
            Message::FontLoaded(font) => {
                if font.0.is_none() {
                    log::warn!("⚠️  Comments will be composed without text");
                }
                self.font = Some(font);
            }
        }

        Task::none()
    }

    /// Rectangle of the open editor, or the seed when nothing is open
    fn current_rect(&self) -> CropRectangle {
        self.editor
            .as_ref()
            .map(|editor| editor.session.rect)
            .unwrap_or(self.seed)
    }

    fn open_editor(&mut self, id: ImageId) {
        let Some(record) = self.images.get(id) else {
            return;
        };
        let dimensions = match library::probe_dimensions(&record.source) {
            Ok(dimensions) => dimensions,
            Err(e) => {
                self.status = format!("Cannot edit {}: {}", id, e);
                return;
            }
        };
        let handle = self
            .thumbnails
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Handle::from_bytes(record.source.to_vec()));

        let mut editor = Editor {
            session: EditSession::open(record, self.seed),
            handle,
            dimensions,
            readouts: Default::default(),
        };
        editor.refresh_readouts();

        self.gestures.attach(id);
        self.editor = Some(editor);
        self.tab = Tab::Edit;
    }

    fn close_editor(&mut self) {
        self.gestures.dispose();
        self.editor = None;
    }

    /// Remove an image and everything derived from it. Closes the editor
    /// if it was the one being edited. Returns `false` for an unknown ID.
    fn delete_image(&mut self, id: ImageId) -> bool {
        if self.images.remove(id).is_none() {
            return false;
        }
        self.thumbnails.remove(&id);
        self.crop_previews.remove(&id);
        if self.editor.as_ref().map(|e| e.session.image_id) == Some(id) {
            self.close_editor();
            self.tab = Tab::Input;
        }
        log::info!("🗑️  Deleted image {}", id);
        true
    }

    /// Write a finished batch back and refresh the previews of what was stored
    fn store_batch(&mut self, report: BatchReport) -> usize {
        let stored = report.store_into(&mut self.images);
        for id in &stored {
            if let Some(crop) = self.images.get(*id).and_then(|record| record.crop_result.as_ref()) {
                self.crop_previews.insert(*id, Handle::from_bytes(crop.jpeg.clone()));
            }
        }
        stored.len()
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let tabs = row![
            tab_button("Input", Tab::Input, self.tab),
            tab_button("Edit", Tab::Edit, self.tab),
            tab_button("Compose", Tab::Compose, self.tab),
        ]
        .spacing(8);

        let body = match self.tab {
            Tab::Input => self.view_input(),
            Tab::Edit => self.view_edit(),
            Tab::Compose => self.view_compose(),
        };

        column![
            tabs,
            scrollable(container(body).padding(4)).height(Length::Fill),
            text(&self.status).size(14),
        ]
        .spacing(16)
        .padding(20)
        .into()
    }

    fn view_input(&self) -> Element<Message> {
        let actions = row![
            button(text("Add images")).on_press(Message::PickFiles).padding(10),
            button(text("Add folder")).on_press(Message::PickFolder).padding(10),
        ]
        .spacing(10);

        let cards: Vec<Element<Message>> = self
            .images
            .iter()
            .enumerate()
            .map(|(index, record)| self.image_card(index, record))
            .collect();

        let gallery: Element<Message> = if cards.is_empty() {
            text("Drop screenshots or a folder onto the window, or use the buttons above.").into()
        } else {
            Wrap::with_elements(cards).spacing(12.0).line_spacing(12.0).into()
        };

        column![actions, gallery].spacing(16).into()
    }

    fn image_card<'a>(&'a self, index: usize, record: &'a ImageRecord) -> Element<'a, Message> {
        let preview = self
            .crop_previews
            .get(&record.id)
            .or_else(|| self.thumbnails.get(&record.id));
        let picture: Element<Message> = match preview {
            Some(handle) => iced::widget::image(handle.clone())
                .width(Length::Fixed(CARD_WIDTH))
                .height(Length::Fixed(CARD_WIDTH * 0.75))
                .content_fit(ContentFit::Contain)
                .into(),
            None => text("No preview").into(),
        };

        let badge = if record.is_cropped() {
            format!("{}  ✂ cropped", index + 1)
        } else {
            format!("{}", index + 1)
        };
        let label = record.label.clone().unwrap_or_else(|| record.id.to_string());

        container(
            column![
                text(badge).size(14),
                picture,
                text(label).size(12),
                row![
                    button(text("Edit")).on_press(Message::EditImage(record.id)),
                    button(text("Delete")).on_press(Message::DeleteImage(record.id)),
                ]
                .spacing(6),
            ]
            .spacing(6)
            .width(Length::Fixed(CARD_WIDTH)),
        )
        .padding(8)
        .style(container::rounded_box)
        .into()
    }

    fn view_edit(&self) -> Element<Message> {
        let preset_buttons: Vec<Element<Message>> = self
            .presets
            .iter()
            .map(|preset| -> Element<Message> {
                let select = button(column![
                    text(&preset.name),
                    text(format!("{:.0}% high", preset.area.height)).size(12),
                ])
                .on_press(Message::PresetSelected(preset.id.clone()));

                if preset.is_builtin() {
                    select.into()
                } else {
                    row![
                        select,
                        button(text("✕")).on_press(Message::DeletePreset(preset.id.clone())),
                    ]
                    .spacing(2)
                    .into()
                }
            })
            .collect();

        let save_preset = row![
            text_input("Preset name", &self.preset_name)
                .on_input(Message::PresetNameChanged)
                .on_submit(Message::SavePreset)
                .width(Length::Fixed(240.0)),
            button(text("Save preset")).on_press(Message::SavePreset),
        ]
        .spacing(8)
        .align_y(Alignment::Center);

        let mut content = column![
            text("Presets").size(18),
            Wrap::with_elements(preset_buttons).spacing(8.0).line_spacing(8.0),
            save_preset,
        ]
        .spacing(12);

        match &self.editor {
            Some(editor) => content = content.push(self.view_editor(editor)),
            None => content = content.push(text("Pick an image on the Input tab to edit its crop.")),
        }

        let batch_ready = !self.images.is_empty() && self.batch_progress.is_none();
        content = content.push(
            button(text(format!("Apply to all ({} images)", self.images.len())))
                .on_press_maybe(batch_ready.then_some(Message::ApplyToAll))
                .padding(10),
        );
        if let Some(progress) = self.batch_progress {
            content = content.push(progress_bar(0.0..=1.0, progress));
        }

        content.into()
    }

    fn view_editor<'a>(&'a self, editor: &'a Editor) -> Element<'a, Message> {
        let (width, height) = editor.surface_size();
        let surface = stack![
            iced::widget::image(editor.handle.clone())
                .content_fit(ContentFit::Fill)
                .width(Length::Fill)
                .height(Length::Fill),
            canvas(CropOverlay {
                rect: editor.session.rect,
                dragging: self.gestures.is_active(),
            })
            .width(Length::Fill)
            .height(Length::Fill),
        ];

        let fields = Edge::ALL
            .iter()
            .zip(&editor.readouts)
            .fold(row![].spacing(12), |fields, (&edge, value)| {
                fields.push(
                    column![
                        text(edge.label()).size(12),
                        text_input("%", value)
                            .on_input(move |v| Message::EdgeInput(edge, v))
                            .width(Length::Fixed(80.0)),
                    ]
                    .spacing(4),
                )
            });

        column![
            container(surface)
                .width(Length::Fixed(width))
                .height(Length::Fixed(height)),
            fields,
            text_input("Comment (optional)", &editor.session.comment)
                .on_input(Message::CommentChanged),
            row![
                button(text("Apply crop")).on_press(Message::ApplyCrop).padding(10),
                button(text("Cancel")).on_press(Message::CloseEditor).padding(10),
            ]
            .spacing(10),
        ]
        .spacing(12)
        .into()
    }

    fn view_compose(&self) -> Element<Message> {
        let list = self
            .images
            .cropped()
            .enumerate()
            .fold(column![].spacing(8), |list, (index, record)| {
                let preview: Element<Message> = match self.crop_previews.get(&record.id) {
                    Some(handle) => iced::widget::image(handle.clone())
                        .width(Length::Fixed(240.0))
                        .into(),
                    None => text("…").into(),
                };
                let comment = if record.comment.is_empty() {
                    "No comment".to_string()
                } else {
                    record.comment.clone()
                };
                list.push(
                    row![text(format!("{}.", index + 1)), preview, text(comment).size(14)]
                        .spacing(12)
                        .align_y(Alignment::Center),
                )
            });

        let options = row![
            text("Width"),
            text_input("1080", &self.max_width_field)
                .on_input(Message::MaxWidthChanged)
                .width(Length::Fixed(90.0)),
            text("Padding"),
            text_input("10", &self.padding_field)
                .on_input(Message::PaddingChanged)
                .width(Length::Fixed(90.0)),
        ]
        .spacing(8)
        .align_y(Alignment::Center);

        let can_compose = self.images.cropped_count() > 0 && !self.composing;
        let compose_label = if self.composing { "Composing..." } else { "Compose" };

        let mut content = column![
            text(format!("{} cropped images", self.images.cropped_count())).size(18),
            list,
            options,
            button(text(compose_label))
                .on_press_maybe(can_compose.then_some(Message::Compose))
                .padding(10),
        ]
        .spacing(12);

        if let Some((_, handle)) = &self.result {
            content = content
                .push(iced::widget::image(handle.clone()).width(Length::Fill))
                .push(button(text("Save PNG")).on_press(Message::SaveResult).padding(10));
        }

        content.into()
    }

    fn subscription(&self) -> Subscription<Message> {
        let drops = event::listen_with(|event, _status, _window| match event {
            iced::Event::Window(window::Event::FileDropped(path)) => Some(Message::FileDropped(path)),
            _ => None,
        });

        if self.gestures.wants_frames() {
            Subscription::batch([drops, window::frames().map(Message::Frame)])
        } else {
            drops
        }
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

fn tab_button(label: &str, tab: Tab, current: Tab) -> Element<'_, Message> {
    button(text(label))
        .on_press_maybe((tab != current).then_some(Message::TabSelected(tab)))
        .padding([6, 16])
        .into()
}

fn main() -> ExitCode {
    let args = cli::Cli::parse();
    logging::init(args.verbose);

    match args.command {
        Some(cli::Command::Compose(compose)) => cli::run_compose(compose),
        None => match run_gui(args.files) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("❌ {}", e);
                ExitCode::FAILURE
            }
        },
    }
}

fn run_gui(files: Vec<PathBuf>) -> iced::Result {
    iced::application("Capstack", Capstack::update, Capstack::view)
        .theme(Capstack::theme)
        .subscription(Capstack::subscription)
        .centered()
        .run_with(move || Capstack::new(files))
}

/// Read image files on the blocking pool
async fn read_files_async(paths: Vec<PathBuf>) -> ImportResult {
    tokio::task::spawn_blocking(move || library::read_files(&paths))
        .await
        .unwrap_or_default()
}

/// Scan a folder recursively and read every image in it
async fn import_folder_async(folder: PathBuf) -> ImportResult {
    tokio::task::spawn_blocking(move || {
        log::info!("🔍 Scanning folder: {}", folder.display());
        let paths = library::scan_folder(&folder);
        library::read_files(&paths)
    })
    .await
    .unwrap_or_default()
}

async fn load_font_async(path: Option<PathBuf>) -> LoadedFont {
    let font = tokio::task::spawn_blocking(move || pipeline::text::find_font(path.as_deref()))
        .await
        .ok()
        .flatten();
    LoadedFont(font)
}

/// Run a batch crop on the blocking pool, streaming progress back to the UI
fn batch_stream(
    items: Vec<(ImageId, Arc<[u8]>)>,
    rect: CropRectangle,
    quality: u8,
) -> impl futures::Stream<Item = BatchEvent> {
    iced::stream::channel(16, move |mut output| async move {
        // The worker reports progress through a channel; forward each step
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let worker = tokio::task::spawn_blocking(move || {
            apply_to_all(&items, rect, quality, |progress| {
                let _ = tx.send(progress);
            })
        });

        while let Some(progress) = rx.recv().await {
            let _ = output.send(BatchEvent::Progress(progress)).await;
        }

        let event = match worker.await {
            Ok(report) => BatchEvent::Finished(report),
            Err(e) => BatchEvent::Crashed(e.to_string()),
        };
        let _ = output.send(event).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Point2;
    use image::{DynamicImage, RgbImage};
    use ui::gesture::{HitTarget, PointerButton, PointerId, PointerPress, SurfaceBounds};

    fn png(width: u32, height: u32) -> Arc<[u8]> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes.into()
    }

    fn app_with_images(count: usize) -> (Capstack, Vec<ImageId>) {
        let mut app = Capstack::with_store(PresetStore::in_memory().ok());
        let ids = (0..count)
            .map(|i| {
                let source = png(40, 20);
                let id = app.images.import(source.clone(), Some(format!("shot-{i}.png")));
                app.thumbnails.insert(id, Handle::from_bytes(source.to_vec()));
                id
            })
            .collect();
        (app, ids)
    }

    fn body_press() -> PointerPress {
        PointerPress {
            pointer: PointerId::MOUSE,
            is_primary: true,
            button: PointerButton::Primary,
            position: Point2::new(50.0, 90.0),
            target: HitTarget::Body,
        }
    }

    const SURFACE: SurfaceBounds = SurfaceBounds {
        x: 0.0,
        y: 0.0,
        width: 200.0,
        height: 100.0,
    };

    #[test]
    fn test_deleting_image_under_edit_closes_editor() {
        let (mut app, ids) = app_with_images(2);
        app.open_editor(ids[0]);
        let session = app.editor.as_ref().unwrap().session.clone();
        assert!(app.gestures.press(body_press(), SURFACE, &session));

        assert!(app.delete_image(ids[0]));

        assert!(app.editor.is_none());
        assert_eq!(app.tab, Tab::Input);
        assert!(!app.gestures.is_active());
        // The controller is detached, so the old session cannot start a gesture
        assert!(!app.gestures.press(body_press(), SURFACE, &session));
        assert!(app.images.get(ids[0]).is_none());
        assert!(!app.thumbnails.contains_key(&ids[0]));
        assert!(!app.delete_image(ids[0]));
    }

    #[test]
    fn test_deleting_other_image_keeps_editor_open() {
        let (mut app, ids) = app_with_images(2);
        app.open_editor(ids[0]);

        assert!(app.delete_image(ids[1]));

        assert_eq!(app.editor.as_ref().map(|e| e.session.image_id), Some(ids[0]));
        assert_eq!(app.images.len(), 1);
    }

    #[test]
    fn test_batch_finish_stores_crops_and_previews() {
        let (mut app, ids) = app_with_images(2);
        app.images.get_mut(ids[1]).unwrap().comment = "kept".into();
        let items: Vec<(ImageId, Arc<[u8]>)> = app
            .images
            .iter()
            .map(|record| (record.id, record.source.clone()))
            .collect();
        let report = apply_to_all(&items, CropRectangle::full(), 90, |_| {});
        app.batch_progress = Some(1.0);

        let _ = app.update(Message::Batch(BatchEvent::Finished(report)));

        assert_eq!(app.images.cropped_count(), 2);
        assert!(ids.iter().all(|id| app.crop_previews.contains_key(id)));
        assert_eq!(app.images.get(ids[1]).unwrap().comment, "kept");
        assert!(app.batch_progress.is_none());
        assert_eq!(app.status, "Cropped 2 images.");
    }
}
