use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Graph access or mutation failed inside the IR.
    #[snafu(transparent)]
    Ir { source: zarya_ir::Error },

    /// A structural invariant the matcher relies on was violated.
    #[snafu(display("internal invariant violated: {message}"))]
    Internal { message: String },
}
