use smallvec::smallvec;
use test_case::test_case;

use crate::config::{
    CustomCallTarget, DotDimensionNumbers, Epilogue, GemmBackendConfig, PrecisionConfig,
};

fn dnums() -> DotDimensionNumbers {
    DotDimensionNumbers {
        lhs_batch: smallvec![],
        lhs_contracting: smallvec![1],
        rhs_batch: smallvec![],
        rhs_contracting: smallvec![0],
    }
}

#[test]
fn json_roundtrip() {
    let config = GemmBackendConfig::for_dot(dnums(), PrecisionConfig::default());
    let blob = config.to_json().unwrap();
    let back = GemmBackendConfig::from_json(&blob).unwrap();
    assert_eq!(back, config);
    assert_eq!(back.alpha_real, 1.0);
    assert_eq!(back.beta, 0.0);
    assert_eq!(back.epilogue, Epilogue::Default);
}

#[test]
fn scale_alpha_is_complex_multiplication() {
    let mut config = GemmBackendConfig::for_dot(dnums(), PrecisionConfig::default());
    config.scale_alpha(2.0, 1.0);
    assert_eq!((config.alpha_real, config.alpha_imag), (2.0, 1.0));
    // (2 + i) * (0 + i) = -1 + 2i
    config.scale_alpha(0.0, 1.0);
    assert_eq!((config.alpha_real, config.alpha_imag), (-1.0, 2.0));
}

#[test_case(Epilogue::Default, Some(Epilogue::Relu))]
#[test_case(Epilogue::Bias, Some(Epilogue::BiasRelu))]
#[test_case(Epilogue::Gelu, None)]
#[test_case(Epilogue::Relu, None)]
fn relu_transitions(from: Epilogue, expected: Option<Epilogue>) {
    assert_eq!(from.with_relu(), expected);
}

#[test_case(Epilogue::Default, false, Some(Epilogue::Gelu))]
#[test_case(Epilogue::Default, true, Some(Epilogue::GeluAux))]
#[test_case(Epilogue::Bias, false, Some(Epilogue::BiasGelu))]
#[test_case(Epilogue::Bias, true, Some(Epilogue::BiasGeluAux))]
#[test_case(Epilogue::Relu, false, None)]
fn gelu_transitions(from: Epilogue, aux: bool, expected: Option<Epilogue>) {
    assert_eq!(from.with_gelu(aux), expected);
}

#[test]
fn aux_epilogues_widen_output() {
    assert!(Epilogue::GeluAux.has_aux_output());
    assert!(Epilogue::BiasGeluAux.has_aux_output());
    assert!(!Epilogue::BiasGelu.has_aux_output());
}

#[test]
fn dimension_number_helpers() {
    let d = DotDimensionNumbers {
        lhs_batch: smallvec![0],
        lhs_contracting: smallvec![2],
        rhs_batch: smallvec![0],
        rhs_contracting: smallvec![1],
    };
    assert!(d.has_batch());
    assert_eq!(d.batch_size(&[8, 4, 16]), 8);
    assert_eq!(d.rhs_non_contracting_count(3), 1);
    assert_eq!(d.rhs_non_contracting_size(&[8, 16, 32]), 32);
    assert!(!dnums().has_batch());
}

#[test]
fn target_names() {
    assert_eq!(CustomCallTarget::GemmLegacy.as_str(), "gemm-legacy");
    assert_eq!(CustomCallTarget::GemmLt.as_str(), "gemm-lt");
    assert_eq!(CustomCallTarget::GemmFp8.as_str(), "gemm-fp8");
}
