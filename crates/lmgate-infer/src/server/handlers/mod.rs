mod describe;
mod predict;

pub use describe::{
    describe_image, describe_image_batch, describe_image_batch_stream, describe_image_stream,
};
pub use predict::{predict, predict_stream};
