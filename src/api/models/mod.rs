// Models module - contains Diagram, GraphicElement, the library blob and the shared entity trait

pub mod diagram;
pub mod entity;
pub mod graphic_element;
pub mod library;

pub use diagram::Diagram;
pub use entity::{EntityKind, SyncEntity};
pub use graphic_element::GraphicElement;
pub use library::{LIBRARY_VERSION, LibraryDocument, LibraryUpload, LibraryUploadAck};
