/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Default absolute intensity difference below which fixed and warped
/// intensities are treated as a match.
pub const DEFAULT_INTENSITY_DIFFERENCE_THRESHOLD: f64 = 0.001;

/// Default base time step of the force functional.
pub const DEFAULT_TIME_STEP: f64 = 1.0;

/// Radius of the displacement-field neighborhood handed to the functional.
/// Voxels closer than this to the border are never updated.
pub const NEIGHBORHOOD_RADIUS: usize = 1;

/// Default number of iterations per resolution level.
pub const DEFAULT_ITERATIONS_PER_LEVEL: usize = 100;

/// Default number of resolution levels in the multi-resolution schedule.
pub const DEFAULT_RESOLUTION_LEVELS: usize = 3;

/// Gaussian blur sigma (in pixels) applied before each 2x downsampling step.
pub const PYRAMID_BLUR_SIGMA: f32 = 1.0;

/// Smallest image side a pyramid level may have.
pub const MIN_PYRAMID_SIZE: usize = 8;

/// Default interval (iterations) between logger lines.
pub const DEFAULT_LOG_INTERVAL: usize = 1;
