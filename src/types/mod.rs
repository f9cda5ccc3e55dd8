//! Domain type descriptors.
//!
//! Every argument, local and return value flowing through a UDF is
//! classified by a [`DType`]. The code generator asks a `DType` for its
//! native representation and the calling-convention mapper asks it for its
//! register demand; the runtime asks it for a stable textual name used in
//! monomorphized extern symbols.

pub mod vector;

use std::fmt;

/// Scalar element kinds usable inside vectors and spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bit,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl Primitive {
    /// Stable textual name, used to derive extern symbol names.
    pub fn type_string(&self) -> &'static str {
        match self {
            Primitive::Bit => "bit",
            Primitive::U8 => "u8",
            Primitive::I8 => "i8",
            Primitive::U16 => "u16",
            Primitive::I16 => "i16",
            Primitive::U32 => "u32",
            Primitive::I32 => "i32",
            Primitive::U64 => "u64",
            Primitive::I64 => "i64",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Primitive::Bit => DType::Bit,
            Primitive::U8 => DType::U8,
            Primitive::I8 => DType::I8,
            Primitive::U16 => DType::U16,
            Primitive::I16 => DType::I16,
            Primitive::U32 => DType::U32,
            Primitive::I32 => DType::I32,
            Primitive::U64 => DType::U64,
            Primitive::I64 => DType::I64,
            Primitive::F32 => DType::F32,
            Primitive::F64 => DType::F64,
        }
    }
}

/// Value-type descriptor for every datum flowing through UDFs.
///
/// Two `DType`s compare by structural equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DType {
    Void,
    Bit,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    /// Pointer + length view over UTF-8 bytes.
    StringView,
    /// Pointer + length view over a primitive buffer.
    Span(Primitive),
    /// SIMD vector view, possibly bit-packed for `Primitive::Bit`.
    SimdVector(Primitive),
    /// Raw pointer to another dtype.
    Ptr(Box<DType>),
    /// The per-invocation runtime context handle.
    ContextPtr,
}

impl DType {
    pub fn is_void(&self) -> bool {
        matches!(self, DType::Void)
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, DType::Ptr(_) | DType::ContextPtr)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DType::U8
                | DType::I8
                | DType::U16
                | DType::I16
                | DType::U32
                | DType::I32
                | DType::U64
                | DType::I64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    pub fn is_bit(&self) -> bool {
        matches!(self, DType::Bit)
    }

    pub fn is_string_view(&self) -> bool {
        matches!(self, DType::StringView)
    }

    pub fn is_span(&self) -> bool {
        matches!(self, DType::Span(_))
    }

    pub fn is_simd_vector(&self) -> bool {
        matches!(self, DType::SimdVector(_))
    }

    pub fn is_context_ptr(&self) -> bool {
        matches!(self, DType::ContextPtr)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Element kind for vectors and spans.
    pub fn elem(&self) -> Option<Primitive> {
        match self {
            DType::Span(p) | DType::SimdVector(p) => Some(*p),
            _ => None,
        }
    }

    /// Pointee dtype for pointers.
    pub fn ptr_to(&self) -> Option<&DType> {
        match self {
            DType::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    /// Bit width for integer kinds.
    pub(crate) fn int_width(&self) -> Option<u32> {
        match self {
            DType::U8 | DType::I8 => Some(8),
            DType::U16 | DType::I16 => Some(16),
            DType::U32 | DType::I32 => Some(32),
            DType::U64 | DType::I64 => Some(64),
            _ => None,
        }
    }

    pub(crate) fn is_signed_integer(&self) -> bool {
        matches!(self, DType::I8 | DType::I16 | DType::I32 | DType::I64)
    }

    /// Stable textual name; also the prefix of member-function symbols.
    pub fn type_string(&self) -> String {
        match self {
            DType::Void => "void".to_string(),
            DType::Bit => "bit".to_string(),
            DType::U8 => "u8".to_string(),
            DType::I8 => "i8".to_string(),
            DType::U16 => "u16".to_string(),
            DType::I16 => "i16".to_string(),
            DType::U32 => "u32".to_string(),
            DType::I32 => "i32".to_string(),
            DType::U64 => "u64".to_string(),
            DType::I64 => "i64".to_string(),
            DType::F32 => "f32".to_string(),
            DType::F64 => "f64".to_string(),
            DType::StringView => "string_view".to_string(),
            DType::Span(p) => format!("span_{}", p.type_string()),
            DType::SimdVector(p) => format!("simd_vector_{}", p.type_string()),
            DType::Ptr(inner) => format!("ptr_{}", inner.type_string()),
            DType::ContextPtr => "Context".to_string(),
        }
    }

    /// Whether a value of `self` may be implicitly widened or reinterpreted
    /// into `other` at a call boundary.
    ///
    /// Identity always casts. Integers widen to equal-or-wider integers
    /// (sign reinterpretation at equal width is allowed), and convert to
    /// either float kind; bits widen like a one-bit integer; floats convert
    /// between each other. Views, vectors and pointers cast only to
    /// themselves.
    pub fn can_cast_to(&self, other: &DType) -> bool {
        if self == other {
            return true;
        }
        if self.is_integer() && other.is_integer() {
            return self.int_width() <= other.int_width();
        }
        if self.is_integer() && other.is_float() {
            return true;
        }
        if self.is_bit() && (other.is_integer() || other.is_float()) {
            return true;
        }
        if self.is_float() && other.is_float() {
            return true;
        }
        false
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(DType::I32.is_integer());
        assert!(!DType::I32.is_float());
        assert!(DType::F64.is_float());
        assert!(DType::Bit.is_bit());
        assert!(DType::ContextPtr.is_ptr());
        assert!(DType::ContextPtr.is_context_ptr());
        assert!(DType::SimdVector(Primitive::F32).is_simd_vector());
        assert_eq!(DType::SimdVector(Primitive::F32).elem(), Some(Primitive::F32));
        let p = DType::Ptr(Box::new(DType::I64));
        assert_eq!(p.ptr_to(), Some(&DType::I64));
    }

    #[test]
    fn test_type_strings() {
        assert_eq!(DType::SimdVector(Primitive::F32).type_string(), "simd_vector_f32");
        assert_eq!(DType::StringView.type_string(), "string_view");
        assert_eq!(DType::Ptr(Box::new(DType::F64)).type_string(), "ptr_f64");
    }

    #[test]
    fn test_cast_feasibility() {
        assert!(DType::I32.can_cast_to(&DType::I64));
        assert!(DType::I32.can_cast_to(&DType::U64));
        assert!(DType::U32.can_cast_to(&DType::I32));
        assert!(!DType::I64.can_cast_to(&DType::I32));
        assert!(DType::I32.can_cast_to(&DType::F32));
        assert!(DType::F32.can_cast_to(&DType::F64));
        assert!(DType::F64.can_cast_to(&DType::F32));
        assert!(!DType::F32.can_cast_to(&DType::I32));
        assert!(DType::Bit.can_cast_to(&DType::I32));
        let v32 = DType::SimdVector(Primitive::F32);
        let v64 = DType::SimdVector(Primitive::F64);
        assert!(v32.can_cast_to(&v32.clone()));
        assert!(!v32.can_cast_to(&v64));
    }
}
