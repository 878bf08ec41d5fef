// Export module
// Persists merged matrices for MATLAB / SciPy consumers

pub mod mat;

pub use mat::{encode_mat, validate_variable_name, write_mat, WriteError};
