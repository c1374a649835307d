use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapError {
    #[error("Unable to clone request")]
    Clone,
}

#[derive(Error, Debug, PartialEq)]
pub enum MetadataError {
    #[error("Unable to locate '{0}' tag")]
    MissingTag(String),
    #[error("Invalid value for '{tag}': {value}")]
    InvalidValue { tag: String, value: String },
    #[error("No pixel grid size for resolution {0}m")]
    MissingResolution(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum GeometryError {
    #[error("Unsupported EPSG code: {0}")]
    UnsupportedEpsg(u32),
    #[error("Projection failed: {0}")]
    Projection(String),
    #[error("Degenerate bounding box: {0:?}")]
    DegenerateBounds([f64; 4]),
}

#[derive(Error, Debug, PartialEq)]
pub enum RasterError {
    #[error("Not a JPEG 2000 file or codestream")]
    UnknownFormat,
    #[error("Raster header truncated")]
    Truncated,
    #[error("Image header box not found")]
    MissingHeader,
}

#[derive(Error, Debug, PartialEq)]
pub enum RecordError {
    #[error("Unsupported record type: {0}")]
    UnsupportedType(String),
    #[error("Unable to locate a product segment in: {0}")]
    InvalidSceneUrl(String),
    #[error("Unable to parse capture date from: {0}")]
    InvalidCaptureDate(String),
    #[error("Unable to parse band and resolution from: {0}")]
    InvalidAssetName(String),
    #[error("Collection {0} has no spatial extent")]
    MissingExtent(String),
    #[error("Item {0} is already part of the collection")]
    DuplicateItem(String),
    #[error("Item {id} does not match its scene folder {product}")]
    SceneMismatch { id: String, product: String },
}
