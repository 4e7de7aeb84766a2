//! Buffer descriptors shared between the kernel definition and the device
//! layer.
//!
//! A kernel declares the buffers it needs as a list of [`BufferSpec`]s; the
//! device layer allocates the paired host/device memory for each and binds
//! them to kernel argument slots grouped by category.

/// Direction of a buffer from the kernel's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferCategory {
    /// Host writes, kernel reads.
    Input,
    /// Kernel writes, host reads.
    Output,
    /// Both directions.
    InputOutput,
}

/// Declaration of one named buffer.
#[derive(Clone, Debug)]
pub struct BufferSpec {
    pub name: String,
    pub size_bytes: usize,
    pub category: BufferCategory,
}

impl BufferSpec {
    pub fn input(name: impl Into<String>, size_bytes: usize) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            category: BufferCategory::Input,
        }
    }

    pub fn output(name: impl Into<String>, size_bytes: usize) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            category: BufferCategory::Output,
        }
    }

    pub fn input_output(name: impl Into<String>, size_bytes: usize) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            category: BufferCategory::InputOutput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_the_category() {
        assert_eq!(BufferSpec::input("a", 1).category, BufferCategory::Input);
        assert_eq!(BufferSpec::output("b", 2).category, BufferCategory::Output);
        assert_eq!(
            BufferSpec::input_output("c", 3).category,
            BufferCategory::InputOutput
        );
    }
}
