use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Operand slot index exceeds the instruction's arity.
    #[snafu(display("operand index {index} out of range for {name} (arity {arity})"))]
    OperandIndexOutOfRange { name: String, index: usize, arity: usize },

    /// Backend configs live on custom-calls only.
    #[snafu(display("{name} is not a custom-call"))]
    NotACustomCall { name: String },

    /// The backend-config blob failed to round-trip through serde.
    #[snafu(display("malformed backend config on {name}: {message}"))]
    MalformedBackendConfig { name: String, message: String },

    /// Replacement would change the observable shape of a value.
    #[snafu(display("cannot replace {old} ({old_shape}) with {new} ({new_shape}): shapes differ"))]
    ReplacementShapeMismatch { old: String, new: String, old_shape: String, new_shape: String },

    /// A removed instruction was used as a replacement or operand.
    #[snafu(display("instruction {name} has been removed from the computation"))]
    InstructionRemoved { name: String },

    /// Variadic operand append on a non-custom-call.
    #[snafu(display("cannot append an operand to {name}: only custom-calls are variadic"))]
    NotVariadic { name: String },

    /// get-tuple-element index exceeds the tuple arity.
    #[snafu(display("tuple index {index} out of range for {name} ({arity} elements)"))]
    TupleIndexOutOfRange { name: String, index: usize, arity: usize },

    /// get-tuple-element on an array-shaped value.
    #[snafu(display("{name} does not have a tuple shape"))]
    NotATuple { name: String },
}
