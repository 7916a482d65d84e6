use ndarray::{Array1, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use structopt::StructOpt;
use tinyflow_core::{graph::Graph, sort::FeedDict, tensor};
use tinyflow_session::{
    interpreter::SessionBuilder,
    train::{standardize, Samples, TrainConfig, Trainer},
};

#[derive(Debug, StructOpt)]
#[structopt(name = "regression")]
struct Opt {
    #[structopt(long = "epochs", help = "The number of epochs", default_value = "100")]
    epochs: usize,

    #[structopt(long = "batch-size", help = "Samples per step", default_value = "11")]
    batch_size: usize,

    #[structopt(long = "lr", help = "Learning rate", default_value = "0.01")]
    learning_rate: f64,

    #[structopt(long = "hidden", help = "Width of the hidden layer", default_value = "10")]
    hidden: usize,

    #[structopt(long = "samples", help = "Size of the dataset", default_value = "506")]
    samples: usize,

    #[structopt(long = "seed", help = "Seed for data, weights and batches", default_value = "0")]
    seed: u64,

    #[structopt(long = "profile", help = "Enable profiling")]
    profile: bool,

    #[structopt(long = "trace", help = "Log every node's value and gradients")]
    trace: bool,
}

fn main() {
    env_logger::init();
    color_backtrace::install();

    let opt = Opt::from_args();
    let mut rng = StdRng::seed_from_u64(opt.seed);

    // A noisy nonlinear target over 13 features.
    let n_features = 13;
    let raw = tensor::randn(&[opt.samples, n_features], &mut rng);
    let features = standardize(&raw).unwrap();
    let targets = features
        .view()
        .into_dimensionality::<ndarray::Ix2>()
        .unwrap()
        .map_axis(Axis(1), |row| {
            row.iter()
                .enumerate()
                .map(|(i, v)| (i as f64 + 1.).sin() * v.tanh())
                .sum::<f64>()
        })
        .mapv(|t| t + 0.1 * rng.gen_range(-1.0..1.0))
        .into_dyn();
    let samples = Samples::new(features, targets).unwrap();

    let mut g = Graph::new();
    let x = g.new_input("X");
    let y = g.new_input("y");
    let w1 = g.new_input("W1");
    let b1 = g.new_input("b1");
    let w2 = g.new_input("W2");
    let b2 = g.new_input("b2");
    let l1 = g.new_linear(x, w1, b1);
    let s1 = g.new_sigmoid(l1);
    let l2 = g.new_linear(s1, w2, b2);
    g.new_mse(y, l2);

    let feed = FeedDict::new()
        .with(x, samples.features().clone())
        .with(y, samples.targets().clone())
        .with(w1, tensor::randn(&[n_features, opt.hidden], &mut rng))
        .with(b1, Array1::<f64>::zeros(opt.hidden).into_dyn())
        .with(w2, tensor::randn(&[opt.hidden, 1], &mut rng))
        .with(b2, Array1::<f64>::zeros(1).into_dyn());
    let mut sess = SessionBuilder::new(g, feed)
        .with_tracing_enabled(opt.trace)
        .with_profiling_enabled(opt.profile)
        .build()
        .unwrap();

    let config = TrainConfig::default()
        .with_epochs(opt.epochs)
        .with_batch_size(opt.batch_size)
        .with_learning_rate(opt.learning_rate)
        .with_seed(opt.seed);
    let losses = Trainer::new(config)
        .fit(&mut sess, x, y, &samples, &[w1, b1, w2, b2])
        .expect("Training failed");

    for (epoch, loss) in losses.iter().enumerate() {
        println!("epoch {:>4}: loss {:.6}", epoch + 1, loss);
    }
}
