//! Fresh names for one compilation unit. Every generated name starts with an
//! underscore, which the textual IR reserves, so they never collide with names
//! that came from the input.

use bimap::BiMap;

use crate::ir::GlobalVariable;

/// The function a program starts in unless told otherwise.
pub const DEFAULT_ENTRY: &str = "_compiled_program_main";

#[derive(Debug, Default)]
pub struct ResourceAllocator {
    next_temp: usize,
    next_label: usize,
    next_register: usize,
    /// String contents and the global that holds them.
    strings: BiMap<String, String>,
}

impl ResourceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an allocator that reuses the given globals for matching strings.
    pub fn with_globals<'a>(globals: impl IntoIterator<Item = &'a GlobalVariable>) -> Self {
        let mut this = Self::new();
        for global in globals {
            this.strings
                .insert(global.content.clone(), global.name.clone());
        }
        this
    }

    pub fn allocate_temp(&mut self) -> String {
        let id = self.next_temp;
        self.next_temp += 1;
        format!("_t{id}")
    }

    /// A fresh label. The annotation is only there to make the output readable.
    pub fn allocate_label(&mut self, annotation: &str) -> String {
        let id = self.next_label;
        self.next_label += 1;
        format!("_LABEL_{id}_{annotation}")
    }

    /// A fresh abstract register for instruction selection and spilling.
    pub fn allocate_register(&mut self) -> String {
        let id = self.next_register;
        self.next_register += 1;
        format!("_reg{id}")
    }

    /// Get the global holding this string, creating it if it does not exist yet.
    pub fn allocate_string(&mut self, content: &str) -> GlobalVariable {
        if let Some(name) = self.strings.get_by_left(content) {
            return GlobalVariable {
                name: name.clone(),
                content: content.into(),
            };
        }

        let name = format!("_GLOBAL_STRING_{}", self.strings.len());
        self.strings.insert(content.into(), name.clone());
        GlobalVariable {
            name,
            content: content.into(),
        }
    }

    /// All string globals, in no particular order.
    pub fn globals(&self) -> Vec<GlobalVariable> {
        self.strings
            .iter()
            .map(|(content, name)| GlobalVariable {
                name: name.clone(),
                content: content.clone(),
            })
            .collect()
    }
}

/// The label every return in `function` jumps to.
pub fn epilogue_label(function: &str) -> String {
    format!("_LABEL_EPILOGUE_FOR_{function}")
}

/// The temporary holding a callee-saved register across a function body.
pub fn callee_saved_storage(register: &str) -> String {
    format!("_CALLEE_SAVED_STORAGE_{register}")
}
