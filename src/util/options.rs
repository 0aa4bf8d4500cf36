use crate::util::constants::*;
use std::default::Default;

fn always_valid<T>(_: &T) -> bool {
    true
}

fn is_percentage(v: &f64) -> bool {
    (0.0..=100.0).contains(v)
}

fn is_valid_region_size(v: &usize) -> bool {
    v.is_power_of_two() && (MIN_BYTES_IN_REGION..=MAX_BYTES_IN_REGION).contains(v)
}

macro_rules! options {
    ($($name:ident: $type:ty[$validator:expr] = $default:expr),*,) => [
        options!($($name: $type[$validator] = $default),*);
    ];
    ($($name:ident: $type:ty[$validator:expr] = $default:expr),*) => [
        #[derive(Clone, Debug)]
        pub struct Options {
            $(pub $name: $type),*
        }
        impl Options {
            /// Set an option from its string form. Returns `false` and keeps the current value
            /// if the value cannot be parsed or fails validation.
            pub fn set_from_str(&mut self, s: &str, val: &str) -> bool {
                match s {
                    // Parse the given value from str (by env vars or by calling set_option()) to the right type
                    $(stringify!($name) => if let Ok(ref val) = val.parse::<$type>() {
                        // Validate
                        let validate_fn = $validator;
                        let is_valid = validate_fn(val);
                        if is_valid {
                            // Only set value if valid.
                            self.$name = val.clone();
                        } else {
                            warn!("Unable to set {}={:?}. Invalid value. Default value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        warn!("Unable to set {}={:?}. Cant parse value. Default value will be used.", s, val);
                        false
                    })*
                    _ => panic!("Invalid Options key: {}", s)
                }
            }

            /// Options with their default values, ignoring the environment.
            pub fn without_env() -> Self {
                Options {
                    $($name: $default),*
                }
            }
        }
        impl Default for Options {
            fn default() -> Self {
                let mut options = Options::without_env();

                // If we have env vars that start with G1GC_ and match any option (such as G1GC_REGION_SIZE),
                // we set the option to its value (if it is a valid value). Otherwise, use the default value.
                const PREFIX: &str = "G1GC_";
                for (key, val) in std::env::vars() {
                    // strip the prefix, and get the lower case string
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { options.set_from_str(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
                options
            }
        }
    ]
}

options! {
    // Size of the managed heap in bytes. Rounded up to a whole number of regions.
    heap_size:                        usize [|v: &usize| *v > 0]          = DEFAULT_HEAP_SIZE,
    // Size of a region in bytes. A power of two between 4 KiB and 32 MiB.
    region_size:                      usize [is_valid_region_size]        = DEFAULT_REGION_SIZE,
    // Soft goal for the length of a stop-the-world pause.
    pause_time_target_ms:             u32   [|v: &u32| *v > 0]            = 200,
    // Old-region occupancy (in percent of all regions) that starts a concurrent marking cycle.
    initiating_heap_occupancy_percent: f64  [is_percentage]               = 45.0,
    // Number of young collections an object survives before it is promoted.
    tenuring_threshold:               u8    [|v: &u8| *v <= MAX_AGE]      = MAX_AGE,
    // Number of parallel GC workers used in stop-the-world pauses.
    threads:                          usize [|v: &usize| *v > 0]          = num_cpus::get(),
    // Number of background marking threads. With 0, mutators advance marking at poll points.
    concurrent_threads:               usize [always_valid]                = 1,
    // Fixed eden size in regions. 0 lets the pause time predictor size eden.
    eden_regions:                     usize [always_valid]                = 0,
    // Old-region occupancy (in percent) at which an unfinished marking cycle is abandoned.
    critical_occupancy_percent:       f64   [is_percentage]               = 90.0,
    // A mixed phase spreads its candidate regions over at least this many pauses.
    mixed_gc_count_target:            usize [|v: &usize| *v > 0]          = 8,
    // Old regions whose live ratio is above this percentage are never evacuated by mixed collections.
    mixed_gc_live_threshold_percent:  f64   [is_percentage]               = 85.0,
    // Stop the mixed phase when the garbage left in candidates is below this share of the heap.
    heap_waste_percent:               f64   [is_percentage]               = 5.0,
    // Capacity of a mutator's SATB buffer before it is handed to the marker.
    satb_buffer_size:                 usize [|v: &usize| *v > 0]          = 256,
    // Should we ignore GCs requested by the user?
    ignore_system_gc:                 bool  [always_valid]                = false,
    // Verify the heap after every pause.
    verify_heap:                      bool  [always_valid]                = false,
}

impl Options {
    /// Number of regions in the heap.
    pub fn heap_regions(&self) -> usize {
        self.heap_size.div_ceil(self.region_size)
    }
}
