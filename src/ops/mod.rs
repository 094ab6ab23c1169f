pub mod composite;
pub mod inpaint;
