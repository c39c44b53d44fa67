use crate::resources::FilenameTable;

/// What a [`Managed`] placeholder stands for once it is bound to a node.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagedKind {
    /// User file read by the job.
    InputFile {
        fnames: Option<FilenameTable>,
        template: Option<String>,
    },
    /// User file written by the job.
    OutputFile {
        fnames: Option<FilenameTable>,
        template: Option<String>,
    },
    TempInputFile,
    TempOutputFile,
    TempInputObj,
    TempOutputObj,
    /// The node's value on the axis named by the placeholder.
    InputInstance,
    /// The list of values of the axis named by the placeholder.
    InputChunks,
    /// Sets the values of the axis named by the placeholder.
    OutputChunks,
    /// A string formatted from the node's values.
    Template { template: String },
}

/// A placeholder in a job's arguments, replaced by a concrete value when the
/// job is instantiated at a node.
///
/// `axes` says which prefix of the job's node the placeholder is bound to.
/// If `axes` extends the job's axes by one more axis, the placeholder is a
/// split (for outputs) or a merge (for inputs) over that extra axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Managed {
    pub name: String,
    pub axes: Vec<String>,
    pub kind: ManagedKind,
}

impl Managed {
    fn new(name: &str, axes: &[&str], kind: ManagedKind) -> Self {
        Self {
            name: name.to_owned(),
            axes: axes.iter().map(|s| s.to_string()).collect(),
            kind,
        }
    }

    pub fn input_file(name: &str, axes: &[&str]) -> Self {
        Self::new(name, axes, ManagedKind::InputFile { fnames: None, template: None })
    }

    pub fn output_file(name: &str, axes: &[&str]) -> Self {
        Self::new(name, axes, ManagedKind::OutputFile { fnames: None, template: None })
    }

    pub fn temp_input_file(name: &str, axes: &[&str]) -> Self {
        Self::new(name, axes, ManagedKind::TempInputFile)
    }

    pub fn temp_output_file(name: &str, axes: &[&str]) -> Self {
        Self::new(name, axes, ManagedKind::TempOutputFile)
    }

    pub fn temp_input_obj(name: &str, axes: &[&str]) -> Self {
        Self::new(name, axes, ManagedKind::TempInputObj)
    }

    pub fn temp_output_obj(name: &str, axes: &[&str]) -> Self {
        Self::new(name, axes, ManagedKind::TempOutputObj)
    }

    pub fn input_instance(axis: &str) -> Self {
        Self::new(axis, &[axis], ManagedKind::InputInstance)
    }

    /// Values of `axis` below the node bound by `axes`.
    pub fn input_chunks(axis: &str, axes: &[&str]) -> Self {
        Self::new(axis, axes, ManagedKind::InputChunks)
    }

    pub fn output_chunks(axis: &str, axes: &[&str]) -> Self {
        Self::new(axis, axes, ManagedKind::OutputChunks)
    }

    pub fn template(template: &str, axes: &[&str]) -> Self {
        Self::new(
            template,
            axes,
            ManagedKind::Template {
                template: template.to_owned(),
            },
        )
    }

    /// Name user files through `template` instead of treating `name` as the template.
    /// Has no effect on other kinds.
    pub fn with_template(mut self, text: &str) -> Self {
        if let ManagedKind::InputFile { template, .. } | ManagedKind::OutputFile { template, .. } =
            &mut self.kind
        {
            *template = Some(text.to_owned());
        }
        self
    }

    /// Name user files from an explicit table keyed by node values.
    /// Has no effect on other kinds.
    pub fn with_fnames(mut self, table: FilenameTable) -> Self {
        if let ManagedKind::InputFile { fnames, .. } | ManagedKind::OutputFile { fnames, .. } =
            &mut self.kind
        {
            *fnames = Some(table);
        }
        self
    }

    /// true if a function's return value can be bound to this placeholder.
    pub fn accepts_return(&self) -> bool {
        matches!(self.kind, ManagedKind::TempOutputObj | ManagedKind::OutputChunks)
    }
}
