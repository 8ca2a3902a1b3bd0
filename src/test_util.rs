#![cfg(test)]
use crate::affine::Affine2;
use crate::bounds::InputBounds;
use crate::dnn::{Dense, Layer, ReLU, DNN};
use crate::AdvFloat;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;
use proptest::arbitrary::functor::ArbitraryF1;
use proptest::prelude::*;
use proptest::sample::SizeRange;

prop_compose! {
    pub fn array1(len: usize)(v in Vec::lift1_with(-10. .. 10., SizeRange::new(len..=len))) -> Array1<f64> {
        Array1::from_vec(v)
    }
}

prop_compose! {
    pub fn array2(rows: usize, cols: usize)(v in Vec::lift1_with(array1(cols), SizeRange::new(rows..=rows))) -> Array2<f64> {
        assert!(rows > 0);
        ndarray::stack(Axis(0), &v.iter().map(|x| x.view()).collect::<Vec<ArrayView1<f64>>>()).unwrap()
    }
}

prop_compose! {
    pub fn affine2(in_dim: usize, out_dim: usize)(basis in array2(out_dim, in_dim), shift in array1(out_dim)) -> Affine2 {
        Affine2::new(basis, shift)
    }
}

prop_compose! {
    /// A nonzero vector scaled to unit length.
    pub fn unit_vector(len: usize)(v in array1(len).prop_filter("nonzero", |v| v.dot(v) > 1e-6)) -> Array1<AdvFloat> {
        let norm = v.dot(&v).sqrt();
        v / norm
    }
}

prop_compose! {
    /// Inputs inside the unit box, away from its faces.
    pub fn unit_box_inputs(rows: usize, cols: usize)(x in array2(rows, cols)) -> Array2<AdvFloat> {
        x.mapv(|v| 0.1 + 0.8 * (v + 10.) / 20.)
    }
}

prop_compose! {
    pub fn fc_dnn(input_size: usize, output_size: usize, nlayers: usize, max_layer_width: usize)(repr_sizes in Vec::lift1_with(1..max_layer_width, SizeRange::new(nlayers..=nlayers)).prop_map(move |mut x| {x.insert(0, input_size); x.push(output_size); x}))(affines in {let pairs = repr_sizes.iter().zip(repr_sizes.iter().skip(1)); pairs.map(|(&x, &y)| affine2(x,y)).collect::<Vec<_>>()}) -> DNN {
        let mut layers: Vec<Layer> = vec![];
        let n_affines = affines.len();
        for (i, aff) in affines.into_iter().enumerate() {
            let output_dim = aff.output_dim();
            layers.push(Dense::new(aff).into());
            if i + 1 < n_affines {
                layers.push(ReLU::new(output_dim).into());
            }
        }
        DNN::new(layers, InputBounds::default()).unwrap()
    }
}

/// Two classes on the unit box, class 1 iff `x0 > 0.5`; `x1` is ignored.
pub fn threshold_model() -> DNN {
    let dense = Dense::from_parts(
        ndarray::arr2(&[[-5., 0.], [5., 0.]]),
        ndarray::arr1(&[2.5, -2.5]),
    )
    .unwrap();
    DNN::new(vec![dense.into()], InputBounds::default()).unwrap()
}
